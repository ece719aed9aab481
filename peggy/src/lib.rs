pub mod address;
pub mod batch;
pub mod cfg;
pub mod confirm;
pub mod db;
pub mod denom;
pub mod error;
pub mod external;
pub mod handler;
pub mod keeper;
pub mod logic_call;
pub mod pool;
pub mod query;
pub mod test_util;
pub mod token;
pub mod valset;
