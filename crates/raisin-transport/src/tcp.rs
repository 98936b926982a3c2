//! TCP 流会话
//!
//! 分帧格式：`[u32 大端长度][JSON 帧体]`。
//! 接收端使用 `BytesMut` 累积缓冲，读超时不会丢失半帧数据。

use crate::{
    BoxedRx, BoxedTx, Connector, Endpoint, Session, SessionRx, SessionTx, TransportError,
    TransportKind,
};
use bytes::{Buf, BufMut, BytesMut};
use raisin_protocol::{Frame, MAX_FRAME_SIZE, ProtocolError};
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, trace};

const LEN_PREFIX: usize = 4;
const READ_CHUNK: usize = 64 * 1024;

/// 将帧编码为带长度前缀的字节
pub fn encode_frame(frame: &Frame, dst: &mut BytesMut) -> Result<(), TransportError> {
    let body = frame.to_bytes()?;
    dst.reserve(LEN_PREFIX + body.len());
    dst.put_u32(body.len() as u32);
    dst.put_slice(&body);
    Ok(())
}

/// 从缓冲区中解出一帧（数据不足时返回 `Ok(None)`）
pub fn decode_frame(src: &mut BytesMut) -> Result<Option<Frame>, TransportError> {
    if src.len() < LEN_PREFIX {
        return Ok(None);
    }
    let len = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            len,
            max: MAX_FRAME_SIZE,
        }
        .into());
    }
    if src.len() < LEN_PREFIX + len {
        return Ok(None);
    }
    src.advance(LEN_PREFIX);
    let body = src.split_to(len);
    Ok(Some(Frame::from_bytes(&body)?))
}

/// TCP 会话建立器
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl TcpConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for TcpConnector {
    fn open(
        &self,
        endpoint: &Endpoint,
        timeout: Duration,
    ) -> Result<Box<dyn Session>, TransportError> {
        let addr = resolve(endpoint)?;
        debug!("Opening TCP session to {}", addr);
        let stream = TcpStream::connect_timeout(&addr, timeout)?;
        stream.set_nodelay(true)?;
        Ok(Box::new(TcpSession { stream }))
    }
}

fn resolve(endpoint: &Endpoint) -> Result<SocketAddr, TransportError> {
    (endpoint.address.as_str(), endpoint.port)
        .to_socket_addrs()
        .map_err(|e| TransportError::InvalidEndpoint(format!("{}: {}", endpoint, e)))?
        .next()
        .ok_or_else(|| TransportError::InvalidEndpoint(endpoint.to_string()))
}

/// TCP 会话（split 前）
pub struct TcpSession {
    stream: TcpStream,
}

impl TcpSession {
    /// 由已连接的流构建会话（服务端 accept 后也可使用）
    pub fn from_stream(stream: TcpStream) -> Self {
        Self { stream }
    }
}

impl Session for TcpSession {
    fn kind(&self) -> TransportKind {
        TransportKind::Stream
    }

    fn split(self: Box<Self>) -> Result<(BoxedRx, BoxedTx), TransportError> {
        let read_half = self.stream.try_clone()?;
        let rx = TcpRx {
            stream: read_half,
            buf: BytesMut::with_capacity(READ_CHUNK),
            current_timeout: None,
        };
        let tx = TcpTx {
            stream: self.stream,
            buf: BytesMut::new(),
        };
        Ok((Box::new(rx), Box::new(tx)))
    }
}

/// TCP 接收端
pub struct TcpRx {
    stream: TcpStream,
    buf: BytesMut,
    current_timeout: Option<Duration>,
}

impl SessionRx for TcpRx {
    fn receive_timeout(&mut self, timeout: Duration) -> Result<Frame, TransportError> {
        if let Some(frame) = decode_frame(&mut self.buf)? {
            return Ok(frame);
        }

        // 零超时对 set_read_timeout 非法，取 1ms 下限
        let timeout = timeout.max(Duration::from_millis(1));
        if self.current_timeout != Some(timeout) {
            self.stream.set_read_timeout(Some(timeout))?;
            self.current_timeout = Some(timeout);
        }

        let mut chunk = [0u8; 4096];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => {
                    self.buf.extend_from_slice(&chunk[..n]);
                    if let Some(frame) = decode_frame(&mut self.buf)? {
                        trace!("TCP RX frame: {}", frame.kind());
                        return Ok(frame);
                    }
                },
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Err(TransportError::Timeout);
                },
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// TCP 发送端
pub struct TcpTx {
    stream: TcpStream,
    buf: BytesMut,
}

impl SessionTx for TcpTx {
    fn send(&mut self, frame: &Frame) -> Result<(), TransportError> {
        self.buf.clear();
        encode_frame(frame, &mut self.buf)?;
        self.stream.write_all(&self.buf)?;
        Ok(())
    }

    fn close(&mut self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}
