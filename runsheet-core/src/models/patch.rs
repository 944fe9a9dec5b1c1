use serde::{Deserialize, Serialize};

/// Partial update of a single execution step.
///
/// Every field distinguishes "absent" (`None`, leave the step alone) from a
/// present value, so `Some(String::new())` clears a remark while `None`
/// keeps it. A JSON `null` deserializes as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remark_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remark_image: Option<String>,
}

impl StepPatch {
    pub fn checked(checked: bool) -> Self {
        Self {
            checked: Some(checked),
            ..Default::default()
        }
    }

    pub fn remark_text(text: impl Into<String>) -> Self {
        Self {
            remark_text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn remark_image(url: impl Into<String>) -> Self {
        Self {
            remark_image: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.checked.is_none() && self.remark_text.is_none() && self.remark_image.is_none()
    }

    /// Checkbox toggles bypass the debounce queue.
    pub fn is_immediate(&self) -> bool {
        self.checked.is_some()
    }
}

/// One entry of a batch request: the patch for the step at `step_idx`.
///
/// The index is signed on the wire so a negative entry reaches the merge
/// and is skipped there like any other out-of-range index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepUpdate {
    #[serde(rename = "stepIdx")]
    pub step_idx: i64,
    pub patch: StepPatch,
}

impl StepUpdate {
    pub fn new(step_idx: usize, patch: StepPatch) -> Self {
        Self {
            step_idx: i64::try_from(step_idx).unwrap_or(i64::MAX),
            patch,
        }
    }

    /// `None` for negative indices.
    pub fn index(&self) -> Option<usize> {
        usize::try_from(self.step_idx).ok()
    }
}

/// Body of `PATCH /api/executions/{id}/steps/batch`. Entries apply in order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStepUpdate {
    #[serde(default)]
    pub updates: Vec<StepUpdate>,
}

impl BatchStepUpdate {
    pub fn new(updates: Vec<StepUpdate>) -> Self {
        Self { updates }
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_fields_are_not_serialized() {
        let json = serde_json::to_string(&StepPatch::remark_text("")).unwrap();
        assert_eq!(json, r#"{"remarkText":""}"#);

        let json = serde_json::to_string(&StepPatch::checked(false)).unwrap();
        assert_eq!(json, r#"{"checked":false}"#);
    }

    #[test]
    fn test_null_is_absent() {
        let patch: StepPatch =
            serde_json::from_str(r#"{"checked":null,"remarkText":"ok"}"#).unwrap();
        assert_eq!(patch.checked, None);
        assert_eq!(patch.remark_text.as_deref(), Some("ok"));
        assert!(!patch.is_immediate());
    }

    #[test]
    fn test_batch_wire_format() {
        let body: BatchStepUpdate = serde_json::from_str(
            r#"{"updates":[{"stepIdx":2,"patch":{"remarkImage":"/uploads/a-1.png"}}]}"#,
        )
        .unwrap();
        assert_eq!(body.len(), 1);
        assert_eq!(body.updates[0].step_idx, 2);
        assert_eq!(
            body.updates[0].patch,
            StepPatch::remark_image("/uploads/a-1.png")
        );
    }

    #[test]
    fn test_negative_step_index_parses() {
        let body: BatchStepUpdate = serde_json::from_str(
            r#"{"updates":[{"stepIdx":-1,"patch":{"checked":true}},{"stepIdx":0,"patch":{}}]}"#,
        )
        .unwrap();
        assert_eq!(body.updates[0].step_idx, -1);
        assert_eq!(body.updates[0].index(), None);
        assert_eq!(body.updates[1].index(), Some(0));
    }

    #[test]
    fn test_empty_patch() {
        assert!(StepPatch::default().is_empty());
        assert!(!StepPatch::checked(true).is_empty());
    }
}
