pub(crate) mod conj;
pub(crate) mod select;
pub(crate) mod stack;
