use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open capture device {interface}: {source}")]
    Open {
        interface: String,
        #[source]
        source: pcap::Error,
    },
    #[error("failed to activate capture on {interface}: {source}")]
    Activate {
        interface: String,
        #[source]
        source: pcap::Error,
    },
    #[error("dispatch failed on {interface}: {source}")]
    Dispatch {
        interface: String,
        #[source]
        source: pcap::Error,
    },
}
