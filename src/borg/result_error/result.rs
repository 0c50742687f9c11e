use crate::borg::result_error::error::Error;
use crate::borg::result_error::{WithDebugObjectAndFnName, WithMsg};
use std::fmt::Debug;

pub type Result<T> = std::result::Result<T, Error>;

impl<S: Into<String>, O: Debug + Send + 'static, R> WithDebugObjectAndFnName<S, O> for Result<R> {
    fn with_debug_object_and_fn_name(self, obj: O, fn_name: S) -> Self {
        self.map_err(|e| e.with_debug_object_and_fn_name(obj, fn_name))
    }
}

impl<R, S: Into<String>> WithMsg<S> for Result<R> {
    fn with_msg(self, msg: S) -> Self {
        self.map_err(|e| e.with_msg(msg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_with_msg_wraps_error() {
        let res: Result<()> = Err(Error::RepositoryLocked("/srv/a".into()));
        match res.with_msg("Pruning failed") {
            Err(Error::WithMsg { msg, .. }) => assert_eq!(msg, "Pruning failed"),
            other => panic!("Expected WithMsg, got {other:?}"),
        }
    }
}
