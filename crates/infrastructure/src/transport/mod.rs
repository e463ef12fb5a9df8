mod agent;
mod http_task;

pub use agent::AgentTransport;
pub use http_task::HttpTaskTransport;
