/// Conversations an organization may collect before new ones are refused.
pub const DEFAULT_SUBMISSION_LIMIT: u64 = 200;

/// Id of the seeded public demo form. It is exempt from submission limits.
pub const DEMO_FORM_ID: &str = "demo";

/// Organization owning the demo form.
pub const DEMO_ORGANIZATION_ID: &str = "demo";

/// Name of the function the model calls once every field is collected.
pub const SAVE_FORM_DATA_FUNCTION: &str = "saveFormData";

/// Maximum messages accepted in a single conversation payload.
pub const MAX_CONVERSATION_MESSAGES: usize = 100;

/// Maximum characters in one conversation message.
pub const MAX_MESSAGE_CHARS: usize = 4000;

/// Maximum characters in a form overview.
pub const MAX_FORM_OVERVIEW_CHARS: usize = 255;

/// Maximum characters in workspace and form names.
pub const MAX_NAME_CHARS: usize = 100;

/// Maximum concurrent sessions per user.
pub const MAX_SESSIONS_PER_USER: usize = 10;

pub const DEFAULT_WORKSPACE_NAME: &str = "New Workspace";
pub const DEFAULT_FORM_NAME: &str = "New Form";
pub const DEFAULT_WELCOME_TITLE: &str = "Hi there, please fill this form";
pub const DEFAULT_WELCOME_MESSAGE: &str =
    "We're collecting responses through a short conversation. It only takes a minute.";
pub const DEFAULT_WELCOME_CTA: &str = "Start";

/// Closing message sent once the form data is stored.
pub const COMPLETION_MESSAGE: &str =
    "Thank you! Your responses have been recorded. You can close this window now.";

/// 列表接口默认分页大小
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// 列表接口最大分页大小
pub const MAX_PAGE_SIZE: usize = 100;
