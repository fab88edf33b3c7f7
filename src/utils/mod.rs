pub mod db_utils;
pub mod pagination;
pub mod time_requests;
