//! Request and response documents.

use crate::error::{KernelError, Result};
use serde::{Deserialize, Serialize};

/// Request kinds understood by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Execute,
    Inspect,
    Reset,
    Status,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Execute => "execute",
            Action::Inspect => "inspect",
            Action::Reset => "reset",
            Action::Status => "status",
        }
    }
}

impl std::str::FromStr for Action {
    type Err = KernelError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "execute" => Ok(Action::Execute),
            "inspect" => Ok(Action::Inspect),
            "reset" => Ok(Action::Reset),
            "status" => Ok(Action::Status),
            other => Err(KernelError::protocol(format!("unknown action '{}'", other))),
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single request. Built fresh for every connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RequestDocument", into = "RequestDocument")]
pub enum Request {
    Execute { code: String },
    Inspect { pattern: String },
    Reset,
    Status,
}

impl Request {
    pub fn execute(code: impl Into<String>) -> Self {
        Request::Execute { code: code.into() }
    }

    pub fn inspect(pattern: impl Into<String>) -> Self {
        Request::Inspect {
            pattern: pattern.into(),
        }
    }

    pub fn action(&self) -> Action {
        match self {
            Request::Execute { .. } => Action::Execute,
            Request::Inspect { .. } => Action::Inspect,
            Request::Reset => Action::Reset,
            Request::Status => Action::Status,
        }
    }
}

/// Flat on-the-wire shape of a request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RequestDocument {
    /// Older callers omit the action and mean `execute`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pattern: Option<String>,
}

impl TryFrom<RequestDocument> for Request {
    type Error = KernelError;

    fn try_from(doc: RequestDocument) -> Result<Self> {
        let action = match doc.action.as_deref() {
            None => Action::Execute,
            Some(raw) => raw.parse()?,
        };

        Ok(match action {
            Action::Execute => Request::Execute {
                code: doc
                    .code
                    .ok_or_else(|| KernelError::protocol("execute request without 'code'"))?,
            },
            Action::Inspect => Request::Inspect {
                pattern: doc.pattern.unwrap_or_default(),
            },
            Action::Reset => Request::Reset,
            Action::Status => Request::Status,
        })
    }
}

impl From<Request> for RequestDocument {
    fn from(request: Request) -> Self {
        let action = Some(request.action().as_str().to_string());
        match request {
            Request::Execute { code } => RequestDocument {
                action,
                code: Some(code),
                pattern: None,
            },
            Request::Inspect { pattern } => RequestDocument {
                action,
                code: None,
                pattern: Some(pattern),
            },
            Request::Reset | Request::Status => RequestDocument {
                action,
                ..Default::default()
            },
        }
    }
}

/// Outcome of running one snippet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    /// Rendered traceback when `success` is false.
    pub error: Option<String>,
}

/// Reflection of one namespace entry. Derived on demand, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub size_bytes: u64,
    /// Human-readable size ("24 B", "1.5 KB").
    pub size: String,
    pub preview: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectResult {
    pub success: bool,
    pub count: usize,
    pub variables: Vec<VariableInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetResult {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResult {
    pub success: bool,
    pub uptime_seconds: f64,
    pub uptime_human: String,
    pub variable_count: usize,
    /// `None` when the platform cannot report resident memory.
    pub memory_usage_bytes: Option<u64>,
    pub memory_usage: String,
}

/// Returned for requests the kernel could not decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResult {
    pub success: bool,
    pub error: String,
}

/// A single response, mirroring [`Request`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Response {
    Execute(ExecuteResult),
    Inspect(InspectResult),
    Reset(ResetResult),
    Status(StatusResult),
    Error(ErrorResult),
}

impl Response {
    /// Build an error document.
    pub fn error(message: impl Into<String>) -> Self {
        Response::Error(ErrorResult {
            success: false,
            error: message.into(),
        })
    }

    pub fn is_success(&self) -> bool {
        match self {
            Response::Execute(r) => r.success,
            Response::Inspect(r) => r.success,
            Response::Reset(r) => r.success,
            Response::Status(r) => r.success,
            Response::Error(_) => false,
        }
    }

    /// Turn an error document into `KernelError::Remote`.
    pub fn into_result(self) -> Result<Self> {
        match self {
            Response::Error(e) => Err(KernelError::Remote { message: e.error }),
            other => Ok(other),
        }
    }
}
