pub mod compression;
pub mod json;
pub mod options;
pub mod text;

#[cfg_attr(docsrs, doc(cfg(feature = "io-jsonl")))]
#[cfg(feature = "io-jsonl")]
pub mod jsonl;

#[cfg_attr(docsrs, doc(cfg(feature = "io-csv")))]
#[cfg(feature = "io-csv")]
pub mod csv;

#[cfg_attr(docsrs, doc(cfg(feature = "io-toml")))]
#[cfg(feature = "io-toml")]
pub mod toml;

#[cfg_attr(docsrs, doc(cfg(feature = "io-object")))]
#[cfg(feature = "io-object")]
pub mod object;
