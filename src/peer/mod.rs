pub mod connection;
pub mod ice;
pub mod session;
pub mod state;
pub mod types;

pub use connection::{Connector, RtcConnection, WebRtcConnector};
pub use ice::CandidateQueue;
pub use session::PeerSession;
pub use state::SignalingState;
pub use types::{
    IceCandidate, MediaKind, PeerEvent, PeerEventKind, PeerTag, RemoteStream, RemoteTrack, SdpKind,
    ServerConfig, SessionDescription, Status, TransportState,
};
