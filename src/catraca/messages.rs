//! Stable machine-readable messages returned in the `detail` field of error
//! responses. Clients match on these verbatim.

pub const INVALID_CONNECTION: &str = "INVALID_CONNECTION";
pub const INVALID_PASSWORD: &str = "INVALID_PASSWORD";
pub const INVALID_ROLE: &str = "INVALID_ROLE";
pub const EMAIL_ALREADY_REGISTERED: &str = "EMAIL_ALREADY_REGISTERED";
pub const USER_NOT_FOUND: &str = "USER_NOT_FOUND";
pub const PASSWORD_NO_MATCH: &str = "PASSWORD_NO_MATCH";
pub const ACCOUNT_IS_NOT_ACTIVE: &str = "ACCOUNT_IS_NOT_ACTIVE";
pub const ACCOUNT_ALREADY_ACTIVE: &str = "ACCOUNT_ALREADY_ACTIVE";
pub const INVALID_CODE: &str = "INVALID_CODE";
pub const NO_PERMISSION: &str = "NO_PERMISSION";
pub const INVALID_TOKEN: &str = "INVALID_TOKEN";

// Admin setup uses free-form messages
pub const ACCOUNT_NOT_ACTIVE_DETAIL: &str = "Account is not active";
pub const ACCOUNT_NOT_INSTITUTIONAL: &str = "Account is not @unb";
pub const PRIVILEGED_ROLE_NEEDS_INSTITUTIONAL_EMAIL: &str =
    "Users with ADMIN or COADMIN roles must have an institutional email";
