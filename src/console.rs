// Command dispatcher over the object store

use crate::command::{self, Command};
use crate::error::ShellError;
use crate::models::ModelRegistry;
use crate::record;
use crate::store::Store;
use crate::value::ValueKind;
use eyre::Result;
use serde_json::Value;
use tracing::debug;

/// What the shell should do after a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Print this text
    Text(String),
    /// Print the validation message
    Error(ShellError),
    /// Print nothing
    Nothing,
    /// End the session, optionally printing a newline first
    Quit { newline: bool },
}

/// Interactive console bound to a single store
pub struct Console {
    store: Store,
    registry: ModelRegistry,
}

impl Console {
    pub fn new(store: Store) -> Self {
        Self::with_registry(store, ModelRegistry::default())
    }

    pub fn with_registry(store: Store, registry: ModelRegistry) -> Self {
        Self { store, registry }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Parse and run one input line
    pub fn run_line(&mut self, line: &str) -> Result<Response> {
        self.execute(Command::parse(line))
    }

    pub fn execute(&mut self, command: Command) -> Result<Response> {
        debug!(?command, "execute");
        match command {
            Command::Create(args) => self.create(&args),
            Command::Show(args) => self.show(&args),
            Command::Destroy(args) => self.destroy(&args),
            Command::All(args) => Ok(self.all(&args)),
            Command::Update(args) => self.update(&args),
            Command::Help(topic) => Ok(Self::help(topic.as_deref())),
            Command::Quit => Ok(Response::Quit { newline: false }),
            Command::Eof => Ok(Response::Quit { newline: true }),
            Command::Empty => Ok(Response::Nothing),
            Command::Unknown(line) => Ok(Response::Text(format!("*** Unknown syntax: {}", line))),
        }
    }

    /// `create <class>`: register a fresh record, persist, reply with its id
    ///
    /// The whole argument list must name a class, so trailing words are rejected.
    pub fn create(&mut self, args: &[String]) -> Result<Response> {
        let class_name = match args.first() {
            Some(name) => name,
            None => return Ok(Response::Error(ShellError::ClassNameMissing)),
        };
        if args.len() > 1 || !self.registry.contains(class_name) {
            return Ok(Response::Error(ShellError::ClassDoesNotExist));
        }

        let record = self.store.create(class_name);
        let (key, id) = (record.key(), record.id().to_string());
        self.store.save(&key)?;

        Ok(Response::Text(id))
    }

    /// `show <class> <id>`: reload from disk, then display the record
    pub fn show(&mut self, args: &[String]) -> Result<Response> {
        let key = match self.instance_key(args) {
            Ok(key) => key,
            Err(e) => return Ok(Response::Error(e)),
        };

        self.store.reload()?;
        Ok(match self.store.get(&key) {
            Some(record) => Response::Text(record.to_string()),
            None => Response::Error(ShellError::InstanceNotFound),
        })
    }

    /// `destroy <class> <id>`: drop the record and persist the smaller store
    pub fn destroy(&mut self, args: &[String]) -> Result<Response> {
        let key = match self.instance_key(args) {
            Ok(key) => key,
            Err(e) => return Ok(Response::Error(e)),
        };

        if self.store.all_mut().remove(&key).is_none() {
            return Ok(Response::Error(ShellError::InstanceNotFound));
        }
        self.store.persist()?;
        Ok(Response::Nothing)
    }

    /// `all [<class>]`: display every record, or those whose key starts with `<class>`
    pub fn all(&self, args: &[String]) -> Response {
        let prefix = args.first().map(String::as_str);
        if let Some(class_name) = prefix {
            if !self.registry.contains(class_name) {
                return Response::Error(ShellError::ClassDoesNotExist);
            }
        }

        Response::Text(format!("[{}]", self.list(prefix).join(", ")))
    }

    /// Display strings of all records, filtered by composite-key prefix
    pub fn list(&self, prefix: Option<&str>) -> Vec<String> {
        self.store
            .all()
            .iter()
            .filter(|(key, _)| prefix.is_none_or(|p| key.starts_with(p)))
            .map(|(_, record)| record.to_string())
            .collect()
    }

    /// `update <class> <id> <attr> <value>`
    ///
    /// Reloads, then sets the attribute. A value for an attribute the record
    /// already has is converted to that attribute's kind; a new attribute is
    /// stored as text. The store is persisted even when the instance is missing.
    pub fn update(&mut self, args: &[String]) -> Result<Response> {
        let key = match self.instance_key(args) {
            Ok(key) => key,
            Err(e) => return Ok(Response::Error(e)),
        };

        self.store.reload()?;
        let record = match self.store.get_mut(&key) {
            Some(record) => record,
            None => {
                self.store.persist()?;
                return Ok(Response::Error(ShellError::InstanceNotFound));
            }
        };

        let (name, raw) = match (args.get(2), args.get(3)) {
            (None, _) => return Ok(Response::Error(ShellError::AttributeNameMissing)),
            (Some(_), None) => return Ok(Response::Error(ShellError::ValueMissing)),
            (Some(name), Some(raw)) => (name, raw),
        };
        if record::is_reserved(name) {
            return Ok(Response::Error(ShellError::ReadOnlyAttribute));
        }

        let value = match record.attribute(name) {
            Some(current) => {
                let kind = ValueKind::of(current);
                match kind.coerce(raw) {
                    Some(value) => value,
                    None => return Ok(Response::Error(ShellError::InvalidValue { kind })),
                }
            }
            None => Value::String(raw.clone()),
        };

        debug!(key = %key, attribute = %name, "update: setting attribute");
        record.set_attribute(name.clone(), value)?;
        self.store.save(&key)?;
        Ok(Response::Nothing)
    }

    fn help(topic: Option<&str>) -> Response {
        match topic {
            None => Response::Text(command::help_index()),
            Some(topic) => match command::help_topic(topic) {
                Some(text) => Response::Text(text.to_string()),
                None => Response::Text(format!("*** No help on {}", topic)),
            },
        }
    }

    /// Validate `<class> <id>` arguments and build the composite key
    fn instance_key(&self, args: &[String]) -> std::result::Result<String, ShellError> {
        let class_name = args.first().ok_or(ShellError::ClassNameMissing)?;
        if !self.registry.contains(class_name) {
            return Err(ShellError::ClassDoesNotExist);
        }
        let id = args.get(1).ok_or(ShellError::InstanceIdMissing)?;
        Ok(format!("{}.{}", class_name, id))
    }
}
