use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{RunsheetError, RunsheetResult};

/// One checklist entry of a runbook. Position in `Runbook::steps` is the
/// checklist order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepTemplate {
    pub text: String,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

impl StepTemplate {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            link: None,
            image: None,
        }
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Runbook {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[sqlx(json)]
    #[serde(default)]
    pub steps: Vec<StepTemplate>,
    pub created_at: DateTime<Utc>,
}

/// Body of `POST /api/runbooks`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRunbook {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub steps: Vec<StepTemplate>,
}

impl NewRunbook {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_step(mut self, step: StepTemplate) -> Self {
        self.steps.push(step);
        self
    }

    /// Client-side form rules: a title and a text for every step. The server
    /// accepts whatever it is sent.
    pub fn validate(&self) -> RunsheetResult<()> {
        validate_title(&self.title)?;
        validate_steps(&self.steps)
    }

    pub fn into_runbook(self) -> Runbook {
        Runbook {
            id: Uuid::new_v4(),
            title: self.title,
            description: self.description,
            steps: self.steps,
            created_at: Utc::now(),
        }
    }
}

/// Body of `PUT /api/runbooks/{id}`. Absent fields are left untouched; a
/// present `steps` replaces the whole sequence, which is how steps get
/// reordered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunbookUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<StepTemplate>>,
}

impl RunbookUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.steps.is_none()
    }

    pub fn validate(&self) -> RunsheetResult<()> {
        if let Some(title) = &self.title {
            validate_title(title)?;
        }
        if let Some(steps) = &self.steps {
            validate_steps(steps)?;
        }
        Ok(())
    }

    pub fn apply_to(self, runbook: &mut Runbook) {
        if let Some(title) = self.title {
            runbook.title = title;
        }
        if let Some(description) = self.description {
            runbook.description = description;
        }
        if let Some(steps) = self.steps {
            runbook.steps = steps;
        }
    }
}

fn validate_title(title: &str) -> RunsheetResult<()> {
    if title.trim().is_empty() {
        return Err(RunsheetError::ValidationError(
            "runbook title is required".to_string(),
        ));
    }
    Ok(())
}

fn validate_steps(steps: &[StepTemplate]) -> RunsheetResult<()> {
    for (idx, step) in steps.iter().enumerate() {
        if step.text.trim().is_empty() {
            return Err(RunsheetError::ValidationError(format!(
                "step {} text is required",
                idx + 1
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_runbook_validate() {
        let ok = NewRunbook::new("Deploy").with_step(StepTemplate::new("Check CI"));
        assert!(ok.validate().is_ok());

        let no_title = NewRunbook::new("  ").with_step(StepTemplate::new("Check CI"));
        assert!(matches!(
            no_title.validate(),
            Err(RunsheetError::ValidationError(_))
        ));

        let blank_step = NewRunbook::new("Deploy")
            .with_step(StepTemplate::new("Check CI"))
            .with_step(StepTemplate::new(""));
        let err = blank_step.validate().unwrap_err();
        assert!(err.to_string().contains("step 2"));
    }

    #[test]
    fn test_into_runbook_keeps_step_order() {
        let runbook = NewRunbook::new("Deploy")
            .with_description("prod rollout")
            .with_step(StepTemplate::new("a"))
            .with_step(StepTemplate::new("b").with_link("https://ci.example.com"))
            .into_runbook();

        assert_eq!(runbook.title, "Deploy");
        assert_eq!(runbook.description, "prod rollout");
        assert_eq!(runbook.steps[0].text, "a");
        assert_eq!(
            runbook.steps[1].link.as_deref(),
            Some("https://ci.example.com")
        );
    }

    #[test]
    fn test_runbook_update_replaces_steps() {
        let mut runbook = NewRunbook::new("Deploy")
            .with_step(StepTemplate::new("a"))
            .with_step(StepTemplate::new("b"))
            .into_runbook();

        let update = RunbookUpdate {
            steps: Some(vec![StepTemplate::new("b"), StepTemplate::new("a")]),
            ..Default::default()
        };
        update.apply_to(&mut runbook);

        assert_eq!(runbook.title, "Deploy");
        let texts: Vec<&str> = runbook.steps.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["b", "a"]);
    }

    #[test]
    fn test_runbook_json_is_camel_case() {
        let runbook = NewRunbook::new("Deploy").into_runbook();
        let value = serde_json::to_value(&runbook).unwrap();
        assert!(value.get("createdAt").is_some());
        assert!(value.get("created_at").is_none());
    }

    #[test]
    fn test_new_runbook_defaults_missing_fields() {
        let parsed: NewRunbook =
            serde_json::from_str(r#"{"title":"Deploy","steps":[{"text":"Check CI"}]}"#).unwrap();
        assert_eq!(parsed.description, "");
        assert_eq!(parsed.steps[0].link, None);
    }
}
