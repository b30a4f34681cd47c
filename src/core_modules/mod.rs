pub mod classifier;
pub mod corpus;
pub mod model_loader;
pub mod wavelet;
