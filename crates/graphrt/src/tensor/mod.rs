pub mod dtype;
pub mod view;

pub use dtype::{type_code, DType};
pub use view::TensorView;
