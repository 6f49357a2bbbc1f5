pub mod conversations;
pub mod form_fields;
pub mod forms;
pub mod organizations;
pub mod sessions;
pub mod users;
pub mod workspaces;
