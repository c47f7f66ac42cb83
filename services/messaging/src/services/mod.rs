pub mod ingestion;
pub mod logsink;
pub mod producer;
pub mod query_client;
pub mod query_responder;
