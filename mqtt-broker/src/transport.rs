//! The byte-stream boundary the connection FSM talks to. Kept as a trait,
//! grounded in the teacher's own `net::MqttStream` seam, so the FSM never
//! names `TcpStream` directly even though TLS is out of scope here.

use tokio::io::{AsyncRead, AsyncWrite};

pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}
