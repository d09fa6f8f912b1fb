#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("agent {0} is not registered")]
    UnknownAgent(String),

    #[error("agent {0} has no reachable endpoint")]
    Offline(String),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("agent {0} returned an empty reply")]
    EmptyReply(String),

    #[error("agent {0} missed the round deadline")]
    DeadlineExpired(String),

    #[error("agent {0} already has a request in this batch")]
    Busy(String),

    #[error("scripted reply unavailable: {0}")]
    Script(String),
}
