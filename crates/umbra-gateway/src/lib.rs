pub mod activity;
pub mod connection;
pub mod dispatcher;
