use std::io;

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("bind udp port {port}: {source}")]
    Bind { port: u16, source: io::Error },

    #[error("resolve {host}: {source}")]
    Resolve { host: String, source: io::Error },

    #[error("no usable address for {0}")]
    NoAddress(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}
