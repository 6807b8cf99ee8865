pub mod corpus_scanner;
pub mod extractor;
