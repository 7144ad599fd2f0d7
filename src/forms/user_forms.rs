use crate::api::{NewUser, ProfileEdit, UserRecord};
use crate::forms::{
    check_choice, check_email, check_max_length, check_required, is_common_timezone, is_language,
    FormErrors, DEFAULT_LANGUAGE, DEFAULT_TIMEZONE,
};
use serde::Deserialize;

pub const NICKNAME_MAX_LENGTH: usize = 40;

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
    pub csrf_token: String,
}

impl LoginForm {
    pub fn validate(&self) -> FormErrors {
        let mut errors = FormErrors::new();
        check_email(&mut errors, "email", &self.email);
        check_required(&mut errors, "password", &self.password);
        errors
    }
}

#[derive(Deserialize)]
#[serde(default)]
pub struct SignupForm {
    pub email: String,
    pub password: String,
    pub timezone: String,
    pub language: String,
    pub nickname: String,
    pub csrf_token: String,
}

impl Default for SignupForm {
    fn default() -> Self {
        Self {
            email: String::new(),
            password: String::new(),
            timezone: DEFAULT_TIMEZONE.to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
            nickname: String::new(),
            csrf_token: String::new(),
        }
    }
}

impl SignupForm {
    pub fn validate(&self) -> FormErrors {
        let mut errors = FormErrors::new();
        check_email(&mut errors, "email", &self.email);
        check_required(&mut errors, "password", &self.password);
        check_choice(
            &mut errors,
            "timezone",
            &self.timezone,
            is_common_timezone(&self.timezone),
        );
        check_choice(
            &mut errors,
            "language",
            &self.language,
            is_language(&self.language),
        );
        if check_required(&mut errors, "nickname", &self.nickname) {
            check_max_length(&mut errors, "nickname", &self.nickname, NICKNAME_MAX_LENGTH);
        }
        errors
    }

    pub fn to_new_user(&self) -> NewUser {
        NewUser {
            email: self.email.trim().to_string(),
            password: self.password.clone(),
            timezone: self.timezone.clone(),
            language: self.language.clone(),
            nickname: self.nickname.trim().to_string(),
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct ChangePasswordForm {
    pub old_password: String,
    pub new_password1: String,
    pub new_password2: String,
    pub csrf_token: String,
}

impl ChangePasswordForm {
    pub fn validate(&self) -> FormErrors {
        let mut errors = FormErrors::new();
        check_required(&mut errors, "old_password", &self.old_password);
        let has_first = check_required(&mut errors, "new_password1", &self.new_password1);
        let has_second = check_required(&mut errors, "new_password2", &self.new_password2);
        if has_first && has_second && self.new_password1 != self.new_password2 {
            errors.add("new_password2", "The two password fields didn't match.");
        }
        errors
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct ResetPasswordForm {
    pub email: String,
    pub csrf_token: String,
}

impl ResetPasswordForm {
    pub fn validate(&self) -> FormErrors {
        let mut errors = FormErrors::new();
        check_email(&mut errors, "email", &self.email);
        errors
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct EditProfileForm {
    pub email: String,
    pub nickname: String,
    pub timezone: String,
    pub language: String,
    pub csrf_token: String,
}

impl EditProfileForm {
    /// Pre-fills the form from the user's private record.
    pub fn from_record(record: &UserRecord) -> Self {
        Self {
            email: record.email.clone().unwrap_or_default(),
            nickname: record.nickname.clone(),
            timezone: record.timezone.clone(),
            language: record.language.clone(),
            csrf_token: String::new(),
        }
    }

    pub fn validate(&self) -> FormErrors {
        let mut errors = FormErrors::new();
        check_email(&mut errors, "email", &self.email);
        if check_required(&mut errors, "nickname", &self.nickname) {
            check_max_length(&mut errors, "nickname", &self.nickname, NICKNAME_MAX_LENGTH);
        }
        check_choice(
            &mut errors,
            "timezone",
            &self.timezone,
            is_common_timezone(&self.timezone),
        );
        check_choice(
            &mut errors,
            "language",
            &self.language,
            is_language(&self.language),
        );
        errors
    }

    pub fn to_profile_edit(&self) -> ProfileEdit {
        ProfileEdit {
            email: self.email.trim().to_string(),
            nickname: self.nickname.trim().to_string(),
            timezone: self.timezone.clone(),
            language: self.language.clone(),
        }
    }
}

/// Password confirmation for issuing a new API token.
#[derive(Deserialize, Default)]
#[serde(default)]
pub struct RegenerateTokenForm {
    pub password: String,
    pub csrf_token: String,
}

impl RegenerateTokenForm {
    pub fn validate(&self) -> FormErrors {
        let mut errors = FormErrors::new();
        check_required(&mut errors, "password", &self.password);
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forms::REQUIRED;

    fn signup() -> SignupForm {
        SignupForm {
            email: "someone@ossm.test".to_string(),
            password: "longenough".to_string(),
            nickname: "someone".to_string(),
            ..SignupForm::default()
        }
    }

    #[test]
    fn test_signup_defaults() {
        let form = SignupForm::default();
        assert_eq!(form.timezone, "Australia/Sydney");
        assert_eq!(form.language, "en-AU");
    }

    #[test]
    fn test_valid_signup() {
        assert!(signup().validate().is_empty());
    }

    #[test]
    fn test_signup_rejects_unknown_choices() {
        let form = SignupForm {
            timezone: "Nowhere/Special".to_string(),
            language: "xx-XX".to_string(),
            ..signup()
        };
        let errors = form.validate();
        assert!(errors.has("timezone"));
        assert!(errors.has("language"));
        assert!(!errors.has("email"));
    }

    #[test]
    fn test_signup_nickname_length() {
        let form = SignupForm {
            nickname: "n".repeat(41),
            ..signup()
        };
        assert!(form.validate().has("nickname"));
    }

    #[test]
    fn test_signup_payload_trims_identity_fields() {
        let form = SignupForm {
            email: "  someone@ossm.test ".to_string(),
            nickname: " someone ".to_string(),
            ..signup()
        };
        let user = form.to_new_user();
        assert_eq!(user.email, "someone@ossm.test");
        assert_eq!(user.nickname, "someone");
        assert_eq!(user.password, "longenough");
    }

    #[test]
    fn test_login_requires_both_fields() {
        let errors = LoginForm::default().validate();
        assert_eq!(errors.field("email"), [REQUIRED]);
        assert_eq!(errors.field("password"), [REQUIRED]);
    }

    #[test]
    fn test_change_password_mismatch() {
        let form = ChangePasswordForm {
            old_password: "password".to_string(),
            new_password1: "first-choice".to_string(),
            new_password2: "second-choice".to_string(),
            csrf_token: String::new(),
        };
        let errors = form.validate();
        assert_eq!(
            errors.field("new_password2"),
            ["The two password fields didn't match."]
        );
        assert!(!errors.has("new_password1"));
    }

    #[test]
    fn test_edit_form_prefill() {
        let record: UserRecord = serde_json::from_str(
            r#"{"pk":3,"email":"sim@ossm.test","authToken":"ABCDEFabcdef12345678","verificationCode":null,"isActive":true,"accessLevel":20,"nickname":"sim","timezone":"Europe/Stockholm","language":"sv-CHEF","dateCreated":"2016-01-01 00:00:00+0000","lastLogin":null}"#,
        )
        .unwrap();

        let form = EditProfileForm::from_record(&record);
        assert_eq!(form.email, "sim@ossm.test");
        assert_eq!(form.timezone, "Europe/Stockholm");
        assert_eq!(form.language, "sv-CHEF");
        assert!(form.validate().is_empty());
    }
}
