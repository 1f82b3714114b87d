//! VMC protocol sender
//!
//! VMC (Virtual Motion Capture) is an OSC-based protocol for streaming
//! avatar bone and blend-shape data to VTuber applications such as:
//! - VSeeFace
//! - VMC Protocol-compatible renderers
//!
//! Messages used here:
//! - `/VMC/Ext/Bone/Pos <name> <px> <py> <pz> <qx> <qy> <qz> <qw>`
//! - `/VMC/Ext/Blend/Val <name> <value>`
//! - `/VMC/Ext/Blend/Apply` (no arguments, sent once after all blend values)

use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::Mutex;

use crate::error::{Result, SenderError};
use crate::tracking::{HandData, Point3D, Quaternion, Sender, TrackingData};

use super::osc::{encode_message, OscArg};

/// VMC bone names and their MediaPipe hand landmark indices.
///
/// MediaPipe hand indexing: 0 = wrist, then proximal/intermediate/distal/tip
/// per finger. Fingertips (4, 8, 12, 16, 20) have no corresponding rigid
/// bone and are skipped.
const HAND_BONES: [(&str, usize); 16] = [
    ("Hand", 0),
    ("ThumbProximal", 1),
    ("ThumbIntermediate", 2),
    ("ThumbDistal", 3),
    ("IndexProximal", 5),
    ("IndexIntermediate", 6),
    ("IndexDistal", 7),
    ("MiddleProximal", 9),
    ("MiddleIntermediate", 10),
    ("MiddleDistal", 11),
    ("RingProximal", 13),
    ("RingIntermediate", 14),
    ("RingDistal", 15),
    ("LittleProximal", 17),
    ("LittleIntermediate", 18),
    ("LittleDistal", 19),
];

/// Sends tracking data to a single VMC endpoint over a connected UDP socket.
pub struct VmcSender {
    inner: Mutex<SenderState>,
}

struct SenderState {
    socket: Option<UdpSocket>,
    enabled: bool,
}

impl VmcSender {
    /// Create a sender connected to the given VMC endpoint.
    ///
    /// Resolution and connection failures are construction-time errors; no
    /// partially-open sender is ever returned.
    pub fn new(address: &str, port: u16) -> Result<Self> {
        let target = format!("{address}:{port}");

        let dest: SocketAddr = target
            .to_socket_addrs()
            .map_err(|e| SenderError::Resolve {
                addr: target.clone(),
                source: e,
            })?
            .next()
            .ok_or_else(|| SenderError::Resolve {
                addr: target.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::AddrNotAvailable,
                    "no addresses resolved",
                ),
            })?;

        let bind_addr = if dest.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind_addr).map_err(|e| SenderError::Connect {
            addr: target.clone(),
            source: e,
        })?;
        socket.connect(dest).map_err(|e| SenderError::Connect {
            addr: target.clone(),
            source: e,
        })?;

        tracing::info!("VMC sender connected to {}", target);

        Ok(Self {
            inner: Mutex::new(SenderState {
                socket: Some(socket),
                enabled: true,
            }),
        })
    }

    fn write(socket: &UdpSocket, msg: &[u8], what: &str) -> Result<()> {
        socket.send(msg).map_err(|e| SenderError::Write {
            what: what.to_string(),
            source: e,
        })?;
        Ok(())
    }

    fn send_hand_bones(socket: &UdpSocket, side: &str, hand: &HandData) -> Result<()> {
        if hand.landmarks.len() < 21 {
            return Ok(());
        }

        for (suffix, idx) in HAND_BONES {
            let bone = format!("{side}{suffix}");
            let lm = &hand.landmarks[idx];
            // Finger joint rotations are not computed here; identity keeps
            // downstream IK free to solve them.
            let msg = bone_position(&bone, lm.point, Quaternion::IDENTITY);
            Self::write(socket, &msg, &format!("bone {bone}"))?;
        }

        Ok(())
    }
}

impl Sender for VmcSender {
    /// Transmit one snapshot as a VMC message sequence.
    ///
    /// Message order within a call is a protocol contract: the head bone
    /// first, then every blend value, then exactly one blend apply. Hand
    /// bones follow. Delivery is best-effort UDP: a write failure aborts the
    /// rest of the call but already-sent datagrams stand.
    fn send(&self, data: &TrackingData) -> Result<()> {
        let inner = self.inner.lock().unwrap();

        // Disabled is a valid steady no-op state, not an error
        let socket = match (&inner.socket, inner.enabled) {
            (Some(socket), true) => socket,
            _ => return Ok(()),
        };

        if let Some(face) = &data.face {
            let msg = bone_position("Head", face.head_position, face.head_rotation);
            Self::write(socket, &msg, "head bone")?;

            // BTreeMap iteration keeps blend values in lexicographic order
            for (name, &value) in &face.blend_shapes {
                let msg = encode_message(
                    "/VMC/Ext/Blend/Val",
                    &[OscArg::Str(name.clone()), OscArg::Float(value as f32)],
                );
                Self::write(socket, &msg, &format!("blend shape {name}"))?;
            }

            let msg = encode_message("/VMC/Ext/Blend/Apply", &[]);
            Self::write(socket, &msg, "blend apply")?;
        }

        if let Some(hand) = &data.left_hand {
            Self::send_hand_bones(socket, "Left", hand)?;
        }
        if let Some(hand) = &data.right_hand {
            Self::send_hand_bones(socket, "Right", hand)?;
        }

        Ok(())
    }

    /// Idempotent: marks the sender disabled and releases the socket.
    fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.enabled = false;
        inner.socket = None;
        Ok(())
    }
}

/// Build a `/VMC/Ext/Bone/Pos` message.
fn bone_position(bone: &str, pos: Point3D, rot: Quaternion) -> Vec<u8> {
    encode_message(
        "/VMC/Ext/Bone/Pos",
        &[
            OscArg::Str(bone.to_string()),
            OscArg::Float(pos.x as f32),
            OscArg::Float(pos.y as f32),
            OscArg::Float(pos.z as f32),
            OscArg::Float(rot.x as f32),
            OscArg::Float(rot.y as f32),
            OscArg::Float(rot.z as f32),
            OscArg::Float(rot.w as f32),
        ],
    )
}
