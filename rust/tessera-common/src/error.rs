use thiserror::Error;

#[derive(Debug, Error)]
#[error(transparent)]
pub struct Error(Box<ErrorKind>);

pub type StdErrorBoxed = Box<dyn std::error::Error + Send + Sync + 'static>;

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.0.as_ref()
    }

    pub fn into_kind(self) -> ErrorKind {
        *self.0
    }

    /// Name of the shard this error is attributed to, when the failure
    /// happened inside a per-shard operation.
    pub fn shard(&self) -> Option<&str> {
        match self.kind() {
            ErrorKind::OpenFailure { shard, .. }
            | ErrorKind::ShardOperationFailed { shard, .. }
            | ErrorKind::PrepareFailed { shard, .. }
            | ErrorKind::CommitFailed { shard, .. }
            | ErrorKind::RollbackFailed { shard, .. }
            | ErrorKind::LockStateFailure { shard, .. }
            | ErrorKind::WriterClosed { shard } => Some(shard),
            _ => None,
        }
    }

    /// `true` when this error reports an abort attempt on a writer that was
    /// already closed. Rollback treats such failures as success.
    pub fn is_writer_closed(&self) -> bool {
        matches!(self.kind(), ErrorKind::WriterClosed { .. })
    }

    pub fn invalid_arg(name: impl Into<String>, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::InvalidArgument {
                name: name.into(),
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn invalid_operation(name: impl Into<String>) -> Error {
        Error(ErrorKind::InvalidOperation { name: name.into() }.into())
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Error {
        Error(
            ErrorKind::Io {
                context: context.into(),
                source,
            }
            .into(),
        )
    }

    pub fn open_failure<E>(shard: impl Into<String>, source: E) -> Error
    where
        E: Into<StdErrorBoxed>,
    {
        Error(
            ErrorKind::OpenFailure {
                shard: shard.into(),
                source: source.into(),
            }
            .into(),
        )
    }

    pub fn shard_op<E>(shard: impl Into<String>, op: impl Into<String>, source: E) -> Error
    where
        E: Into<StdErrorBoxed>,
    {
        Error(
            ErrorKind::ShardOperationFailed {
                shard: shard.into(),
                op: op.into(),
                source: source.into(),
            }
            .into(),
        )
    }

    pub fn prepare_failed<E>(shard: impl Into<String>, source: E) -> Error
    where
        E: Into<StdErrorBoxed>,
    {
        Error(
            ErrorKind::PrepareFailed {
                shard: shard.into(),
                source: source.into(),
            }
            .into(),
        )
    }

    pub fn commit_failed<E>(shard: impl Into<String>, source: E) -> Error
    where
        E: Into<StdErrorBoxed>,
    {
        Error(
            ErrorKind::CommitFailed {
                shard: shard.into(),
                source: source.into(),
            }
            .into(),
        )
    }

    pub fn rollback_failed<E>(shard: impl Into<String>, source: E) -> Error
    where
        E: Into<StdErrorBoxed>,
    {
        Error(
            ErrorKind::RollbackFailed {
                shard: shard.into(),
                source: source.into(),
            }
            .into(),
        )
    }

    pub fn lock_state<E>(shard: impl Into<String>, source: E) -> Error
    where
        E: Into<StdErrorBoxed>,
    {
        Error(
            ErrorKind::LockStateFailure {
                shard: shard.into(),
                source: source.into(),
            }
            .into(),
        )
    }

    pub fn writer_closed(shard: impl Into<String>) -> Error {
        Error(
            ErrorKind::WriterClosed {
                shard: shard.into(),
            }
            .into(),
        )
    }
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("invalid argument {name}: {message}")]
    InvalidArgument { name: String, message: String },

    #[error("invalid operation {name}")]
    InvalidOperation { name: String },

    #[error("IO error for '{context}': {source}")]
    Io {
        context: String,
        source: std::io::Error,
    },

    #[error("failed to open writer for shard '{shard}': {source}")]
    OpenFailure { shard: String, source: StdErrorBoxed },

    #[error("operation '{op}' failed on shard '{shard}': {source}")]
    ShardOperationFailed {
        shard: String,
        op: String,
        source: StdErrorBoxed,
    },

    #[error("prepare failed on shard '{shard}': {source}")]
    PrepareFailed { shard: String, source: StdErrorBoxed },

    #[error("commit failed on shard '{shard}': {source}")]
    CommitFailed { shard: String, source: StdErrorBoxed },

    #[error("rollback failed on shard '{shard}': {source}")]
    RollbackFailed { shard: String, source: StdErrorBoxed },

    #[error("failed to clear stale lock on shard '{shard}': {source}")]
    LockStateFailure { shard: String, source: StdErrorBoxed },

    #[error("writer for shard '{shard}' is already closed")]
    WriterClosed { shard: String },
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error(kind.into())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::io("", e)
    }
}

impl From<std::convert::Infallible> for Error {
    fn from(_: std::convert::Infallible) -> Self {
        Error::invalid_operation("conversion")
    }
}
