pub mod csrf;
pub mod locale;
pub mod security;

pub use csrf::{
    check_form_token, csrf_validation_middleware, generate_csrf_token, get_or_create_csrf_token,
    validate_csrf_form_field, CsrfToken, CsrfVerified, CSRF_FAILURE_MESSAGE, CSRF_HEADER,
    CSRF_TOKEN_KEY,
};
pub use locale::{locale_middleware, Locale};
pub use security::add_security_headers;
