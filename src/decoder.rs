//! Turns a provider reply into a [`ReferrerRecord`] or an [`OutcomeError`].

use tracing::debug;

use crate::error::OutcomeError;
use crate::models::{RawResponse, ReferrerRecord};

pub const KEY_RESULT_CODE: &str = "result_code";
pub const KEY_DESCRIPTION: &str = "description";
pub const KEY_INSTALL_REFERRER: &str = "install_referrer";
pub const KEY_ONESTORE_PID: &str = "onestore_pid";
pub const KEY_REFERRER_CLICK_TIMESTAMP: &str = "referrer_click_timestamp_seconds";
pub const KEY_INSTALL_BEGIN_TIMESTAMP: &str = "install_begin_timestamp_seconds";

pub const SUCCESS: i64 = 0;
pub const DB_ACCESS_FAIL: i64 = -1;
pub const NOT_FOUND_REFERRER: i64 = -2;
pub const NOT_ALLOWED_PACKAGE: i64 = -3;
pub const INVALID_PACKAGE_NAME: i64 = -4;
/// Read when the reply carries no result code; it always decodes as unknown.
pub const MISSING_RESULT_CODE: i64 = -10;

/// Decodes a reply. `None` in gives `None` out; every reply gives exactly one
/// of a record or an outcome error.
pub fn decode(response: Option<&RawResponse>) -> Option<Result<ReferrerRecord, OutcomeError>> {
    response.map(decode_response)
}

pub fn decode_response(response: &RawResponse) -> Result<ReferrerRecord, OutcomeError> {
    let code = response
        .get_int(KEY_RESULT_CODE)
        .unwrap_or(MISSING_RESULT_CODE);
    debug!(code, "decoding referrer reply");

    let description = |fallback: &str| {
        response
            .get_str(KEY_DESCRIPTION)
            .unwrap_or(fallback)
            .to_string()
    };

    match code {
        SUCCESS => Ok(ReferrerRecord {
            install_referrer: string_or_empty(response, KEY_INSTALL_REFERRER),
            onestore_pid: string_or_empty(response, KEY_ONESTORE_PID),
            referrer_click_timestamp_seconds: timestamp(response, KEY_REFERRER_CLICK_TIMESTAMP),
            install_begin_timestamp_seconds: timestamp(response, KEY_INSTALL_BEGIN_TIMESTAMP),
        }),
        DB_ACCESS_FAIL => Err(OutcomeError::DbAccessFailure(description("DB_ACCESS_FAIL"))),
        NOT_FOUND_REFERRER => Err(OutcomeError::ReferrerNotFound(description(
            "NOT_FOUND_REFERRER",
        ))),
        NOT_ALLOWED_PACKAGE => Err(OutcomeError::NotAllowed(description("NOT_ALLOWED"))),
        INVALID_PACKAGE_NAME => Err(OutcomeError::InvalidPackageName(description(
            "INVALID_PACKAGE_NAME",
        ))),
        other => Err(OutcomeError::Unknown {
            code: other,
            description: format!("resultCode is {other}"),
        }),
    }
}

fn string_or_empty(response: &RawResponse, key: &str) -> String {
    response.get_str(key).unwrap_or_default().to_string()
}

fn timestamp(response: &RawResponse, key: &str) -> i64 {
    response.get_int(key).unwrap_or(-1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn reply(code: i64) -> RawResponse {
        RawResponse::new().with(KEY_RESULT_CODE, code)
    }

    #[test]
    fn nothing_in_nothing_out() {
        assert_eq!(decode(None), None);
    }

    #[test]
    fn success_copies_every_field() {
        let raw = reply(SUCCESS)
            .with(KEY_INSTALL_REFERRER, "utm_source=push&utm_campaign=fall")
            .with(KEY_ONESTORE_PID, "PID-42")
            .with(KEY_REFERRER_CLICK_TIMESTAMP, 1_697_000_000)
            .with(KEY_INSTALL_BEGIN_TIMESTAMP, 1_697_000_123);
        let record = decode(Some(&raw)).unwrap().unwrap();
        assert_eq!(
            record,
            ReferrerRecord {
                install_referrer: "utm_source=push&utm_campaign=fall".into(),
                onestore_pid: "PID-42".into(),
                referrer_click_timestamp_seconds: 1_697_000_000,
                install_begin_timestamp_seconds: 1_697_000_123,
            }
        );
    }

    #[test]
    fn success_defaults_missing_fields() {
        let record = decode_response(&reply(SUCCESS)).unwrap();
        assert_eq!(record.install_referrer, "");
        assert_eq!(record.onestore_pid, "");
        assert_eq!(record.referrer_click_timestamp_seconds, -1);
        assert_eq!(record.install_begin_timestamp_seconds, -1);
    }

    #[rstest]
    #[case(DB_ACCESS_FAIL, OutcomeError::DbAccessFailure("DB_ACCESS_FAIL".into()))]
    #[case(NOT_FOUND_REFERRER, OutcomeError::ReferrerNotFound("NOT_FOUND_REFERRER".into()))]
    #[case(NOT_ALLOWED_PACKAGE, OutcomeError::NotAllowed("NOT_ALLOWED".into()))]
    #[case(INVALID_PACKAGE_NAME, OutcomeError::InvalidPackageName("INVALID_PACKAGE_NAME".into()))]
    fn failure_codes_default_description(#[case] code: i64, #[case] expected: OutcomeError) {
        assert_eq!(decode_response(&reply(code)), Err(expected));
    }

    #[test]
    fn failure_keeps_provider_description() {
        let raw = reply(NOT_ALLOWED_PACKAGE).with(KEY_DESCRIPTION, "blocked");
        assert_eq!(
            decode_response(&raw),
            Err(OutcomeError::NotAllowed("blocked".into()))
        );
    }

    #[test]
    fn missing_code_is_unknown() {
        let raw = RawResponse::new().with(KEY_INSTALL_REFERRER, "x");
        assert_eq!(
            decode_response(&raw),
            Err(OutcomeError::Unknown {
                code: MISSING_RESULT_CODE,
                description: "resultCode is -10".into(),
            })
        );
    }

    #[test]
    fn string_result_code_is_treated_as_missing() {
        let raw = RawResponse::new().with(KEY_RESULT_CODE, "0");
        assert!(matches!(
            decode_response(&raw),
            Err(OutcomeError::Unknown { code: MISSING_RESULT_CODE, .. })
        ));
    }

    #[test]
    fn unknown_ignores_provider_description() {
        let raw = reply(9).with(KEY_DESCRIPTION, "whatever");
        assert_eq!(decode_response(&raw).unwrap_err().description(), "resultCode is 9");
    }

    proptest! {
        #[test]
        fn codes_outside_table_are_unknown(code in any::<i64>().prop_filter("known code", |c| !(-4..=0).contains(c))) {
            let err = decode_response(&reply(code)).unwrap_err();
            prop_assert_eq!(err.code(), code);
            prop_assert!(matches!(err, OutcomeError::Unknown { .. }), "expected OutcomeError::Unknown, got {:?}", err);
            prop_assert!(err.description().contains(&code.to_string()));
        }
    }
}
