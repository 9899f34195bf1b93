pub const TITLE_REQUIRED: &str = "You must provide a title.";
pub const BODY_REQUIRED: &str = "Textarea should not be empty.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PostField {
    #[default]
    Title,
    Body,
}

impl PostField {
    pub fn title(self) -> &'static str {
        match self {
            PostField::Title => "Title",
            PostField::Body => "Body Content",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostForm {
    pub title: String,
    pub body: String,
    pub focus: PostField,
    pub title_error: Option<&'static str>,
    pub body_error: Option<&'static str>,
}

impl PostForm {
    pub fn with_values(title: &str, body: &str) -> Self {
        Self {
            title: title.to_string(),
            body: body.to_string(),
            ..Self::default()
        }
    }

    pub fn insert_char(&mut self, ch: char) {
        match self.focus {
            PostField::Title => {
                if ch != '\n' {
                    self.title.push(ch);
                }
                self.title_error = None;
            }
            PostField::Body => {
                self.body.push(ch);
                self.body_error = None;
            }
        }
    }

    pub fn backspace(&mut self) {
        match self.focus {
            PostField::Title => {
                self.title.pop();
                self.title_error = None;
            }
            PostField::Body => {
                self.body.pop();
                self.body_error = None;
            }
        }
    }

    pub fn toggle_focus(&mut self) {
        match self.focus {
            PostField::Title => {
                self.check_title();
                self.focus = PostField::Body;
            }
            PostField::Body => {
                self.check_body();
                self.focus = PostField::Title;
            }
        }
    }

    pub fn validate(&mut self) -> bool {
        let title_ok = self.check_title();
        let body_ok = self.check_body();
        title_ok && body_ok
    }

    fn check_title(&mut self) -> bool {
        self.title_error = self.title.trim().is_empty().then_some(TITLE_REQUIRED);
        self.title_error.is_none()
    }

    fn check_body(&mut self) -> bool {
        self.body_error = self.body.trim().is_empty().then_some(BODY_REQUIRED);
        self.body_error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_fields_fail_both_rules() {
        let mut form = PostForm::with_values("   ", "\n");
        assert!(!form.validate());
        assert_eq!(form.title_error, Some(TITLE_REQUIRED));
        assert_eq!(form.body_error, Some(BODY_REQUIRED));
    }

    #[test]
    fn leaving_a_field_checks_it_and_typing_clears() {
        let mut form = PostForm::default();
        form.toggle_focus();
        assert_eq!(form.title_error, Some(TITLE_REQUIRED));
        assert_eq!(form.focus, PostField::Body);
        assert_eq!(form.body_error, None);
        form.toggle_focus();
        form.insert_char('T');
        assert_eq!(form.title_error, None);
        assert_eq!(form.title, "T");
    }

    #[test]
    fn title_stays_single_line() {
        let mut form = PostForm::default();
        form.insert_char('a');
        form.insert_char('\n');
        form.toggle_focus();
        form.insert_char('x');
        form.insert_char('\n');
        assert_eq!(form.title, "a");
        assert_eq!(form.body, "x\n");
        assert!(form.validate());
    }
}
