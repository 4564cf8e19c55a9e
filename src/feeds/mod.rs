pub mod book_poller;
pub mod odds;
pub mod sports;
