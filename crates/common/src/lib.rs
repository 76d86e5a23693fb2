// hearth-common: chat domain types and realtime protocol shared by the server and its clients

pub mod protocol;
pub mod types;
