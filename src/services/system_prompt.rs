//! Prompts sent to the completion service for a form.
//!
//! [`FormSchemaSystemPrompt`] is the validated view of a form that the prompts
//! are built from; construct it through [`FormSchemaSystemPrompt::new`] so an
//! empty or oversized overview never reaches the model.

use crate::constants::MAX_FORM_OVERVIEW_CHARS;
use crate::services::llm_provider::ChatMessage;
use crate::store::operations::form_fields::FormField;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PromptSchemaError {
    #[error("form overview must be between 1 and {max} characters")]
    InvalidOverview { max: usize },
    #[error("form must have at least one field")]
    NoFields,
}

#[derive(Debug, Clone)]
pub struct FormSchemaSystemPrompt {
    overview: String,
    form_fields: Vec<FormField>,
}

impl FormSchemaSystemPrompt {
    /// Schema for running a conversation: overview 1..=255 chars, at least one field.
    pub fn new(overview: &str, form_fields: Vec<FormField>) -> Result<Self, PromptSchemaError> {
        let schema = Self::for_field_suggestion(overview, form_fields)?;
        if schema.form_fields.is_empty() {
            return Err(PromptSchemaError::NoFields);
        }
        Ok(schema)
    }

    /// Schema for suggesting a field; the form may not have any fields yet.
    pub fn for_field_suggestion(
        overview: &str,
        form_fields: Vec<FormField>,
    ) -> Result<Self, PromptSchemaError> {
        let overview = overview.trim();
        let len = overview.chars().count();
        if len == 0 || len > MAX_FORM_OVERVIEW_CHARS {
            return Err(PromptSchemaError::InvalidOverview {
                max: MAX_FORM_OVERVIEW_CHARS,
            });
        }
        Ok(Self {
            overview: overview.to_string(),
            form_fields,
        })
    }

    pub fn overview(&self) -> &str {
        &self.overview
    }

    pub fn form_fields(&self) -> &[FormField] {
        &self.form_fields
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPromptService;

impl SystemPromptService {
    pub fn new() -> Self {
        Self
    }

    pub fn get_form_field_names(&self, form: &FormSchemaSystemPrompt) -> Vec<String> {
        form.form_fields
            .iter()
            .map(|field| field.field_name.clone())
            .collect()
    }

    pub fn get_conversation_flow_prompt(&self, form: &FormSchemaSystemPrompt) -> String {
        format!(
            "This platform lets users complete forms through a conversational flow. \
Your task is to create a conversation path based on the provided form information and fields.
You will act like a professional human, so the user does not feel like they are talking to a robot.
Please note that a form field name might consist of multiple words, separated by spaces.

Please adhere to the following rules while creating a conversational flow:

RULES:
- Only pose questions pertaining to the provided form fields.
- Validate each user-provided form field value. If a value appears invalid, ask for user confirmation.
- Keep each question concise and clear, not exceeding 25 words, as users can view only one line at a time.
- If all fields have been answered correctly, save the form data directly into the database without further questions.
- Avoid saving any data after it has been stored.
- Start the first question with a greeting message. Do not ask for confirmation from the user to start form filling.

Here is some context about the form, followed by the form fields:

Form Details: {overview}

Form Fields:
{fields}
",
            overview = form.overview,
            fields = self.get_form_field_names(form).join("\n"),
        )
    }

    pub fn get_conversation_flow_prompt_message(&self, form: &FormSchemaSystemPrompt) -> ChatMessage {
        ChatMessage::system(self.get_conversation_flow_prompt(form))
    }

    pub fn get_generate_form_field_prompt(&self, form: &FormSchemaSystemPrompt) -> String {
        let names = self.get_form_field_names(form);
        let fields = if names.is_empty() {
            "(none yet)".to_string()
        } else {
            names.join("\n")
        };
        format!(
            "This platform lets users complete forms through a conversational flow. \
Your task is to create one new form field based on the provided form information and fields.
Do not repeat an existing field.

Here is some context about the form, followed by the form fields:

Form Details: {overview}

Form Fields:
{fields}

OUTPUT FORMAT JSON:
{{
  \"fieldName\": \"field name\",
  \"fieldDescription\": \"what the field collects\"
}}
",
            overview = form.overview,
        )
    }

    pub fn get_generate_form_field_prompt_message(
        &self,
        form: &FormSchemaSystemPrompt,
    ) -> ChatMessage {
        ChatMessage::system(self.get_generate_form_field_prompt(form))
    }
}
