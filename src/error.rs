//! Binary Error Types

use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("could not load configuration")]
    Config,
    #[display("could not open the index")]
    Index,
    #[display("could not set up the package source")]
    Source,
    #[display("crawl cycle failed")]
    Crawl,
    #[display("query failed")]
    Query,
    #[display("package not indexed: {_0}")]
    NotFound(#[error(not(source))] String),
    #[display("could not write output")]
    Output,
}
