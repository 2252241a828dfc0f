//! Prompt rendering shared by the text-completion oracles.

use super::OracleRequest;

/// A rendered prompt: optional system instruction plus user content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: Option<String>,
    pub user: String,
}

impl Prompt {
    /// System and user parts joined, for oracles that take a single text
    pub fn combined(&self) -> String {
        match &self.system {
            Some(system) => format!("{}\n\n{}", system, self.user),
            None => self.user.clone(),
        }
    }
}

pub fn render(request: &OracleRequest) -> Prompt {
    match request {
        OracleRequest::Generate { prompt, language } => Prompt {
            system: Some(format!(
                "You are an AI assistant. Answer the following question clearly and concisely in {}.",
                language
            )),
            user: prompt.clone(),
        },

        OracleRequest::Translate {
            text,
            source_language,
            target_language,
        } => Prompt {
            system: Some(format!(
                "Translate the following text from {} to {}. Reply with the translation only.",
                source_language, target_language
            )),
            user: text.clone(),
        },

        OracleRequest::Grade {
            question,
            answer,
            rubric,
        } => Prompt {
            system: None,
            user: format!(
                "Evaluate the following response to the question based on this rubric:\n\n\
                 {rubric}\n\n\
                 Question:\n{question}\n\n\
                 Response:\n{answer}\n\n\
                 Please provide a single grade (1, 3, or 5) based on how well the response \
                 matches the criteria in the rubric.\n\
                 Also provide a brief justification for your choice.\n\n\
                 Format your response exactly as shown below:\n\
                 ```json\n\
                 {{\"grade\": <number>, \"justification\": \"<text>\"}}\n\
                 ```"
            ),
        },
    }
}
