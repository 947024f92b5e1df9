mod common;
mod dispatch;
mod store;
