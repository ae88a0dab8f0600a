pub mod descriptor;
pub mod function;
pub mod inference;
pub mod setter;
pub mod signature;
pub mod widgets;
