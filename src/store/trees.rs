pub const USERS: &str = "users";
pub const SESSIONS: &str = "sessions";
pub const ORGANIZATIONS: &str = "organizations";
pub const WORKSPACES: &str = "workspaces";
pub const FORMS: &str = "forms";
pub const FORM_FIELDS: &str = "form_fields";
pub const FORM_FIELD_NAMES: &str = "form_field_names";
pub const CONVERSATIONS: &str = "conversations";
pub const SUBMISSION_COUNTS: &str = "submission_counts";
pub const META: &str = "meta";
