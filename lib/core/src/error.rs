//! Error handling foundation for gatehouse.
//!
//! Only the `Result` alias lives here. The services and access crates each
//! define their own error enums (`ProviderError`, `StoreError`,
//! `AccessError`) and wrap lower-layer reports with `.context()` when a
//! failure crosses from the external services into the access layer.

use rootcause::Report;

/// A Result whose error is a rootcause [`Report`] carrying context `C`.
///
/// `Result<Identity, AccessError>` reads as "an identity, or a report whose
/// current context is an `AccessError`".
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct Denied;

    impl fmt::Display for Denied {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "denied")
        }
    }

    impl std::error::Error for Denied {}

    fn deny() -> Result<(), Denied> {
        Err(Denied.into())
    }

    #[test]
    fn ok_values_pass_through() {
        let ok: Result<&str, Denied> = Ok("allowed");
        assert_eq!(ok.expect("should be ok"), "allowed");
    }

    #[test]
    fn report_keeps_its_context() {
        let report = deny().expect_err("should fail");
        assert!(report.to_string().contains("denied"));
    }
}
