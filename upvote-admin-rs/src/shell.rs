//! Collaborators a page talks to besides the backend: navigation, error
//! dialogs, the page title and text prompts. Pages receive them explicitly.

use std::rc::Rc;

use async_trait::async_trait;

use crate::error::ApiError;
use crate::routes::Route;

pub trait Navigator {
    fn navigate(&self, route: &Route);
    fn open_in_new_window(&self, route: &Route);
}

pub trait ErrorNotifier {
    fn notify(&self, error: &ApiError);
}

pub trait PageTitle {
    fn set_title(&self, title: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptRequest {
    pub title: String,
    pub text: String,
    pub initial_value: String,
}

#[async_trait(?Send)]
pub trait Prompt {
    /// `None` when the user cancels.
    async fn prompt(&self, request: PromptRequest) -> Option<String>;
}

#[derive(Clone)]
pub struct Shell {
    pub navigator: Rc<dyn Navigator>,
    pub notifier: Rc<dyn ErrorNotifier>,
    pub title: Rc<dyn PageTitle>,
    pub prompt: Rc<dyn Prompt>,
}
