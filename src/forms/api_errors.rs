//! Maps `400` error bodies from the user API onto form fields.

use crate::api::{ApiFailure, FailureCode};
use crate::forms::FormErrors;
use tracing::warn;

/// The forms whose submissions the API can reject field by field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormKind {
    Signup,
    EditProfile,
    ChangePassword,
}

impl FormKind {
    /// Form field that shows errors for an API field, if this form has one.
    fn target(self, api_field: &str) -> Option<&'static str> {
        match (self, api_field) {
            (FormKind::Signup | FormKind::EditProfile, "email") => Some("email"),
            (FormKind::Signup | FormKind::EditProfile, "nickname") => Some("nickname"),
            (FormKind::Signup | FormKind::EditProfile, "timezone" | "timezoneName") => {
                Some("timezone")
            }
            (FormKind::Signup, "password") => Some("password"),
            (FormKind::ChangePassword, "password") => Some("new_password1"),
            _ => None,
        }
    }
}

fn duplicate_message(api_field: &str) -> Option<&'static str> {
    match api_field {
        "email" => Some("User already exists with this email."),
        "nickname" => Some("User already exists with this nickname."),
        _ => None,
    }
}

fn invalid_message(api_field: &str, code: &FailureCode) -> Option<&'static str> {
    match (api_field, code) {
        ("email", FailureCode::Length) => Some("Must be 255 characters or less."),
        ("email", FailureCode::Email) => Some("Does not appear to be a valid email address."),
        ("password", FailureCode::Length) => Some("Must be 8 characters or more."),
        ("timezone" | "timezoneName", FailureCode::Length) => {
            Some("Internal server error. Try another timezone.")
        }
        ("nickname", FailureCode::Length) => Some("Must be 40 characters or less."),
        ("nickname", FailureCode::Characters) => {
            Some("Must contain only letters, numbers, spaces, hyphens and underscores.")
        }
        _ => None,
    }
}

/// Fallback shown when a failure has no field on the form.
pub fn rejected_message(reason: &str) -> String {
    format!("The user service rejected the request ({}).", reason)
}

/// Converts an API failure into errors for `kind`.
///
/// Anything without a matching field lands in the non-field errors, once per
/// distinct reason.
pub fn map_failure(kind: FormKind, failure: &ApiFailure) -> FormErrors {
    let mut errors = FormErrors::new();
    let mut unmapped = false;

    match failure {
        ApiFailure::DuplicateKey { field } => {
            match (kind.target(field), duplicate_message(field)) {
                (Some(target), Some(message)) => errors.add(target, message),
                _ => unmapped = true,
            }
        }
        ApiFailure::InvalidInput { fields } => {
            for failed in fields {
                match (
                    kind.target(&failed.field),
                    invalid_message(&failed.field, &failed.code),
                ) {
                    (Some(target), Some(message)) => errors.add(target, message),
                    _ => {
                        warn!(
                            "Unmapped INVALID_INPUT field {} ({:?}) on {:?} form",
                            failed.field, failed.code, kind
                        );
                        unmapped = true;
                    }
                }
            }
        }
        ApiFailure::Unhandled { error } => {
            warn!("User service reported an unhandled error: {}", error);
            unmapped = true;
        }
        ApiFailure::Unknown { reason } => {
            warn!("User service failed with unknown reason {}", reason);
            unmapped = true;
        }
    }

    if unmapped {
        errors.add_non_field(rejected_message(failure.reason()));
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::FieldFailure;

    fn invalid(fields: &[(&str, FailureCode)]) -> ApiFailure {
        ApiFailure::InvalidInput {
            fields: fields
                .iter()
                .map(|(field, code)| FieldFailure {
                    field: field.to_string(),
                    code: code.clone(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_duplicate_keys() {
        let errors = map_failure(
            FormKind::Signup,
            &ApiFailure::DuplicateKey {
                field: "email".to_string(),
            },
        );
        assert_eq!(errors.field("email"), ["User already exists with this email."]);

        let errors = map_failure(
            FormKind::EditProfile,
            &ApiFailure::DuplicateKey {
                field: "nickname".to_string(),
            },
        );
        assert_eq!(
            errors.field("nickname"),
            ["User already exists with this nickname."]
        );
        assert!(errors.non_field().is_empty());
    }

    #[test]
    fn test_signup_invalid_input() {
        let errors = map_failure(
            FormKind::Signup,
            &invalid(&[
                ("email", FailureCode::Email),
                ("password", FailureCode::Length),
                ("timezoneName", FailureCode::Length),
                ("nickname", FailureCode::Characters),
            ]),
        );

        assert_eq!(
            errors.field("email"),
            ["Does not appear to be a valid email address."]
        );
        assert_eq!(errors.field("password"), ["Must be 8 characters or more."]);
        assert_eq!(
            errors.field("timezone"),
            ["Internal server error. Try another timezone."]
        );
        assert_eq!(
            errors.field("nickname"),
            ["Must contain only letters, numbers, spaces, hyphens and underscores."]
        );
        assert!(errors.non_field().is_empty());
    }

    #[test]
    fn test_change_password_targets_new_password() {
        let errors = map_failure(
            FormKind::ChangePassword,
            &invalid(&[("password", FailureCode::Length)]),
        );
        assert_eq!(
            errors.field("new_password1"),
            ["Must be 8 characters or more."]
        );
        assert!(!errors.has("password"));
    }

    #[test]
    fn test_edit_form_has_no_password_field() {
        let errors = map_failure(
            FormKind::EditProfile,
            &invalid(&[("password", FailureCode::Length)]),
        );
        assert!(!errors.has("password"));
        assert_eq!(
            errors.non_field(),
            ["The user service rejected the request (INVALID_INPUT)."]
        );
    }

    #[test]
    fn test_unhandled_error_falls_back() {
        let errors = map_failure(
            FormKind::Signup,
            &ApiFailure::Unhandled {
                error: "boom".to_string(),
            },
        );
        assert_eq!(
            errors.non_field(),
            ["The user service rejected the request (UNHANDLED_ERROR)."]
        );
    }

    #[test]
    fn test_unknown_code_falls_back_once() {
        let errors = map_failure(
            FormKind::Signup,
            &invalid(&[
                ("language", FailureCode::Length),
                ("nickname", FailureCode::Other("WEIRD".to_string())),
            ]),
        );
        assert_eq!(errors.non_field().len(), 1);
    }
}
