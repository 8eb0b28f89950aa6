//! In-memory backend and shell for page tests.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::client::UpvoteClient;
use crate::error::ApiError;
use crate::resources::{ApiRequest, ApiTransport};
use crate::routes::Route;
use crate::shell::{ErrorNotifier, Navigator, PageTitle, Prompt, PromptRequest, Shell};

pub const PREFIX: &str = "/api/web/";

pub fn failure(path: &str) -> ApiError {
    ApiError::Status {
        status: 500,
        path: path.to_string(),
        body: "boom".to_string(),
    }
}

/// Answers requests from canned responses keyed by path. Unscripted paths
/// get a 404.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<HashMap<String, VecDeque<Result<Value, ApiError>>>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    pub fn respond(&self, path: &str, response: Result<Value, ApiError>) -> &Self {
        self.responses
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(response);
        self
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<ApiRequest> {
        self.requests()
            .into_iter()
            .filter(|request| request.path() == path)
            .collect()
    }
}

#[async_trait]
impl ApiTransport for ScriptedTransport {
    async fn send(&self, request: ApiRequest) -> Result<Value, ApiError> {
        let path = request.path();
        self.requests.lock().unwrap().push(request);
        let next = self
            .responses
            .lock()
            .unwrap()
            .get_mut(&path)
            .and_then(VecDeque::pop_front);
        next.unwrap_or_else(|| {
            Err(ApiError::Status {
                status: 404,
                path,
                body: String::new(),
            })
        })
    }
}

/// Holds every request until the test releases it through the returned
/// sender, so completions can be reordered.
#[derive(Default)]
pub struct GatedTransport {
    gates: Mutex<VecDeque<oneshot::Receiver<Result<Value, ApiError>>>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl GatedTransport {
    /// Arms the gate for the next request.
    pub fn gate(&self) -> oneshot::Sender<Result<Value, ApiError>> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().push_back(rx);
        tx
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ApiTransport for GatedTransport {
    async fn send(&self, request: ApiRequest) -> Result<Value, ApiError> {
        let path = request.path();
        self.requests.lock().unwrap().push(request);
        let gate = self.gates.lock().unwrap().pop_front();
        match gate {
            Some(rx) => rx.await.unwrap_or_else(|_| Err(failure(&path))),
            None => Err(failure(&path)),
        }
    }
}

pub fn client_for(transport: Arc<dyn ApiTransport>) -> Arc<UpvoteClient> {
    Arc::new(UpvoteClient::new(transport, PREFIX))
}

/// Records everything the pages ask of the UI.
#[derive(Default)]
pub struct RecordingShell {
    pub navigations: RefCell<Vec<String>>,
    pub new_windows: RefCell<Vec<String>>,
    pub errors: RefCell<Vec<ApiError>>,
    pub titles: RefCell<Vec<String>>,
    pub prompts: RefCell<Vec<PromptRequest>>,
    pub answers: RefCell<VecDeque<Option<String>>>,
}

impl RecordingShell {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn answer(&self, answer: Option<&str>) {
        self.answers
            .borrow_mut()
            .push_back(answer.map(str::to_string));
    }

    pub fn shell(self: &Rc<Self>) -> Shell {
        Shell {
            navigator: self.clone(),
            notifier: self.clone(),
            title: self.clone(),
            prompt: self.clone(),
        }
    }
}

impl Navigator for RecordingShell {
    fn navigate(&self, route: &Route) {
        self.navigations.borrow_mut().push(route.to_string());
    }

    fn open_in_new_window(&self, route: &Route) {
        self.new_windows.borrow_mut().push(route.to_string());
    }
}

impl ErrorNotifier for RecordingShell {
    fn notify(&self, error: &ApiError) {
        self.errors.borrow_mut().push(error.clone());
    }
}

impl PageTitle for RecordingShell {
    fn set_title(&self, title: &str) {
        self.titles.borrow_mut().push(title.to_string());
    }
}

#[async_trait(?Send)]
impl Prompt for RecordingShell {
    async fn prompt(&self, request: PromptRequest) -> Option<String> {
        self.prompts.borrow_mut().push(request);
        self.answers.borrow_mut().pop_front().flatten()
    }
}
