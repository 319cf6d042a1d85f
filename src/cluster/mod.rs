pub mod kubers;
pub mod model;
pub mod stubs;
