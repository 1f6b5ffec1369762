//! Remote-daemon backend (§4.3.4): blocking UDP discovery followed by a
//! textual TCP session protocol. Every request is terminated by a line
//! containing exactly `/`; every reply starts with a one-letter response
//! code (`Y` success, `N` refusal, `E` error, `H` heartbeat, `I` info, `S`
//! sync).

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpStream, UdpSocket};
use std::path::Path;
use std::time::{Duration, Instant, SystemTime};

use crate::calculator::{write_log_file, CalculatorDescriptor, CaseOutcome};
use crate::error::{Error, Result};
use crate::shutdown::ShutdownFlag;

const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct FunzBackend {
    desc: CalculatorDescriptor,
}

impl FunzBackend {
    pub fn new(desc: CalculatorDescriptor) -> Self {
        Self { desc }
    }

    /// Listen on the descriptor's UDP port for a daemon broadcast: line 1
    /// protocol version, line 2 TCP port, remaining lines supported codes.
    fn discover(&self) -> Result<(String, u16, Vec<String>)> {
        let udp_port = self.desc.port.unwrap_or(9999);
        let socket = UdpSocket::bind(("0.0.0.0", udp_port)).map_err(|e| Error::BackendTransportError {
            calculator: self.desc.uri.clone(),
            message: format!("failed to bind discovery socket on port {udp_port}: {e}"),
        })?;
        socket.set_read_timeout(Some(DISCOVERY_TIMEOUT)).ok();

        let mut buf = [0u8; 4096];
        let (n, src) = socket.recv_from(&mut buf).map_err(|e| Error::BackendTransportError {
            calculator: self.desc.uri.clone(),
            message: format!("no daemon broadcast received: {e}"),
        })?;
        let text = String::from_utf8_lossy(&buf[..n]);
        let mut lines = text.lines();
        let version = lines.next().unwrap_or("").to_string();
        let tcp_port: u16 = lines
            .next()
            .and_then(|l| l.trim().parse().ok())
            .ok_or_else(|| Error::BackendTransportError {
                calculator: self.desc.uri.clone(),
                message: "malformed discovery broadcast: missing TCP port".to_string(),
            })?;
        let codes: Vec<String> = lines.map(|l| l.trim().to_string()).filter(|l| !l.is_empty()).collect();

        Ok((src.ip().to_string(), tcp_port, {
            let _ = version;
            codes
        }))
    }

    fn send_request(stream: &mut TcpStream, lines: &[String]) -> std::io::Result<()> {
        for line in lines {
            writeln!(stream, "{line}")?;
        }
        writeln!(stream, "/")?;
        stream.flush()
    }

    fn read_response(reader: &mut BufReader<TcpStream>) -> std::io::Result<Vec<String>> {
        let mut lines = Vec::new();
        loop {
            let mut line = String::new();
            let n = reader.read_line(&mut line)?;
            if n == 0 {
                break;
            }
            let trimmed = line.trim_end_matches(['\n', '\r']).to_string();
            if trimmed == "/" {
                break;
            }
            lines.push(trimmed);
        }
        Ok(lines)
    }
}

impl super::Calculator for FunzBackend {
    fn run(
        &self,
        case_dir: &Path,
        command: &str,
        effective_timeout: Duration,
        shutdown: &ShutdownFlag,
    ) -> Result<CaseOutcome> {
        let start = SystemTime::now();
        let (host, tcp_port, _codes) = match &self.desc.host {
            Some(h) => (h.clone(), self.desc.port.unwrap_or(9999), Vec::new()),
            None => self.discover()?,
        };

        let transport_err = |message: String| Error::BackendTransportError {
            calculator: self.desc.uri.clone(),
            message,
        };

        let stream = TcpStream::connect((host.as_str(), tcp_port)).map_err(|e| {
            transport_err(format!("failed to connect to daemon {host}:{tcp_port}: {e}"))
        })?;
        stream.set_read_timeout(Some(effective_timeout)).ok();
        let mut writer = stream.try_clone().map_err(|e| transport_err(e.to_string()))?;
        let mut reader = BufReader::new(stream);

        // 1. RESERVE
        Self::send_request(&mut writer, &[format!("RESERVE"), command.to_string()])
            .map_err(|e| transport_err(format!("RESERVE failed: {e}")))?;
        let reserve_reply = Self::read_response(&mut reader).map_err(|e| transport_err(e.to_string()))?;
        if reserve_reply.first().map(|s| s.as_str()) != Some("Y") {
            return Err(transport_err(format!("daemon refused reservation: {reserve_reply:?}")));
        }
        let secret = reserve_reply.get(1).cloned().unwrap_or_default();

        // 2. NEWCASE
        let case_name = case_dir.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        Self::send_request(&mut writer, &[format!("NEWCASE"), secret.clone(), case_name, "0".to_string()])
            .map_err(|e| transport_err(format!("NEWCASE failed: {e}")))?;
        let newcase_reply = Self::read_response(&mut reader).map_err(|e| transport_err(e.to_string()))?;
        if newcase_reply.first().map(|s| s.as_str()) != Some("Y") {
            return Err(transport_err(format!("daemon refused case creation: {newcase_reply:?}")));
        }

        // 3. PUTFILE for every input file in case_dir.
        for entry in std::fs::read_dir(case_dir).map_err(Error::Io)? {
            let entry = entry.map_err(Error::Io)?;
            if entry.path().is_file() {
                let bytes = std::fs::read(entry.path()).map_err(Error::Io)?;
                let name = entry.file_name().to_string_lossy().into_owned();
                writeln!(writer, "PUTFILE").and_then(|_| writeln!(writer, "{secret}"))
                    .and_then(|_| writeln!(writer, "{name}"))
                    .and_then(|_| writeln!(writer, "{}", bytes.len()))
                    .map_err(|e| transport_err(format!("PUTFILE header failed: {e}")))?;
                writer.write_all(&bytes).map_err(|e| transport_err(format!("PUTFILE body failed: {e}")))?;
                writeln!(writer).and_then(|_| writeln!(writer, "/")).and_then(|_| writer.flush())
                    .map_err(|e| transport_err(format!("PUTFILE terminator failed: {e}")))?;
                let reply = Self::read_response(&mut reader).map_err(|e| transport_err(e.to_string()))?;
                if reply.first().map(|s| s.as_str()) != Some("Y") {
                    return Err(transport_err(format!("daemon rejected file '{name}': {reply:?}")));
                }
            }
        }

        // 4. EXECUTE, tolerating heartbeats until a terminal Y/N/E.
        Self::send_request(&mut writer, &[format!("EXECUTE"), secret.clone()])
            .map_err(|e| transport_err(format!("EXECUTE failed: {e}")))?;
        let deadline = Instant::now() + effective_timeout;
        let mut summary = Vec::new();
        let (exit_status, cancelled, timed_out) = loop {
            if shutdown.is_set() {
                Self::send_request(&mut writer, &[format!("UNRESERVE"), secret.clone()]).ok();
                break (None, true, false);
            }
            if Instant::now() >= deadline {
                break (None, false, true);
            }
            match Self::read_response(&mut reader) {
                Ok(lines) => {
                    if lines.first().map(|s| s.as_str()) == Some("H") {
                        continue;
                    }
                    let ok = lines.first().map(|s| s.as_str()) == Some("Y");
                    summary = lines;
                    break (Some(if ok { 0 } else { 1 }), false, false);
                }
                Err(_) => break (None, false, true),
            }
        };

        // 5. ARCHIVE + unzip into case_dir, on success.
        if exit_status == Some(0) {
            Self::send_request(&mut writer, &[format!("ARCHIVE"), secret.clone()])
                .map_err(|e| transport_err(format!("ARCHIVE failed: {e}")))?;
            if let Ok(header) = Self::read_response(&mut reader) {
                if header.first().map(|s| s.as_str()) == Some("Y") {
                    if let Some(size_line) = header.get(1) {
                        if let Ok(size) = size_line.parse::<usize>() {
                            let mut bytes = vec![0u8; size];
                            let _ = reader.read_exact(&mut bytes);
                            if let Ok(mut archive) = zip::ZipArchive::new(std::io::Cursor::new(bytes)) {
                                for i in 0..archive.len() {
                                    if let Ok(mut entry) = archive.by_index(i) {
                                        if entry.is_file() {
                                            if let Some(name) = entry.enclosed_name() {
                                                let dest = case_dir.join(name);
                                                if let Some(parent) = dest.parent() {
                                                    let _ = std::fs::create_dir_all(parent);
                                                }
                                                if let Ok(mut out) = std::fs::File::create(&dest) {
                                                    let _ = std::io::copy(&mut entry, &mut out);
                                                }
                                            }
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }

        // 6. UNRESERVE.
        Self::send_request(&mut writer, &[format!("UNRESERVE"), secret]).ok();

        let end = SystemTime::now();
        let stdout_path = case_dir.join("out.txt");
        let stderr_path = case_dir.join("err.txt");
        std::fs::write(&stdout_path, summary.join("\n")).map_err(Error::Io)?;
        std::fs::write(&stderr_path, b"").map_err(Error::Io)?;
        let log_path = write_log_file(
            case_dir,
            command,
            exit_status,
            start,
            end,
            &std::env::current_dir().unwrap_or_else(|_| case_dir.to_path_buf()),
        )?;

        let error = if cancelled {
            Some(Error::CancellationError)
        } else if timed_out {
            Some(Error::TimeoutError {
                calculator: self.desc.uri.clone(),
                seconds: effective_timeout.as_secs(),
            })
        } else if exit_status != Some(0) {
            Some(Error::BackendExecError {
                calculator: self.desc.uri.clone(),
                message: format!("daemon execution reported failure: {summary:?}"),
            })
        } else {
            None
        };

        Ok(CaseOutcome {
            exit_status,
            stdout_path,
            stderr_path,
            log_path,
            error,
            cached: false,
        })
    }

    fn identity(&self) -> &str {
        &self.desc.uri
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_funz_code_with_no_authority() {
        let desc = CalculatorDescriptor::parse("funz://code-name").unwrap();
        assert_eq!(desc.scheme, super::super::Scheme::Funz);
        assert_eq!(desc.command, "code-name");
        assert!(desc.host.is_none());
    }
}
