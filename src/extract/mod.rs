mod second_order;
mod translator;

pub use second_order::{Degree, SecondOrder, SecondOrderRow, SecondOrderTable};
pub use translator::Translator;
