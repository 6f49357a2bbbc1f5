pub mod conversation;
pub mod llm_provider;
pub mod system_prompt;
