/// Text field state for composing a new item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DraftInput {
    text: String,
}

impl DraftInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    /// Starts a submission: hands back the entered name and clears the field.
    /// An empty field yields `None` and stays as it is.
    pub fn take_submission(&mut self) -> Option<String> {
        if self.text.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.text))
    }
}
