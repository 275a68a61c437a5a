pub(crate) mod refresher;
