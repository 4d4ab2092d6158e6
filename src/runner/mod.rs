pub mod local;
pub mod lookup;
pub mod stubs;
pub mod traits;
pub mod words;
