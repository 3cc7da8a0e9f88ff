// User-facing validation outcomes of shell commands

use crate::value::ValueKind;
use thiserror::Error;

/// Validation failures reported to the user
///
/// These never end the session; the message is printed and the shell reads
/// the next command. Storage failures travel separately as `eyre::Report`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShellError {
    #[error("** class name missing **")]
    ClassNameMissing,

    #[error("** class doesn't exist **")]
    ClassDoesNotExist,

    #[error("** instance id missing **")]
    InstanceIdMissing,

    #[error("** no instance found **")]
    InstanceNotFound,

    #[error("** attribute name missing **")]
    AttributeNameMissing,

    #[error("** value missing **")]
    ValueMissing,

    #[error("** attribute can't be updated **")]
    ReadOnlyAttribute,

    #[error("** value can't be converted to {kind} **")]
    InvalidValue { kind: ValueKind },
}
