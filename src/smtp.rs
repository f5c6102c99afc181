//! Inbound SMTP protocol adapter.
//!
//! A deliberately small, line-oriented command loop: one [`Session`] per
//! connection, reset between messages. Any error coming out of the session is
//! answered with a fixed generic reply — internal failure detail is logged,
//! never written to the wire.

use std::io::Cursor;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

use crate::mailbox::Mailbox;
use crate::session::Session;

/// Inbound SMTP listener bound to a mailbox.
pub struct SmtpServer {
    mailbox: Mailbox,
    domain: String,
}

impl SmtpServer {
    pub fn new(mailbox: Mailbox, domain: &str) -> Self {
        Self {
            mailbox,
            domain: domain.to_string(),
        }
    }

    /// Accept loop; one task per connection.
    pub async fn serve(self, listener: TcpListener) -> std::io::Result<()> {
        loop {
            let (stream, peer) = listener.accept().await?;
            debug!(%peer, "smtp connection accepted");
            let session = self.mailbox.session();
            let domain = self.domain.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, session, &domain).await {
                    debug!(%peer, error = %e, "smtp connection closed with error");
                }
            });
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    mut session: Session,
    domain: &str,
) -> std::io::Result<()> {
    let (read, mut write) = stream.into_split();
    let mut reader = BufReader::new(read);

    reply(&mut write, &format!("220 {domain} ESMTP ready")).await?;

    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            return Ok(());
        }
        let command = String::from_utf8_lossy(&line);
        let command = command.trim_end();
        let upper = command.to_ascii_uppercase();

        if upper.starts_with("HELO") || upper.starts_with("EHLO") {
            info!(id = %session.id(), command, "HELO");
            reply(&mut write, &format!("250 {domain} greets you")).await?;
        } else if let Some(arg) = upper.strip_prefix("MAIL FROM:") {
            let arg = mailbox_argument(command, command.len() - arg.len());
            info!(id = %session.id(), from = arg, "MAIL");
            match session.set_mail(arg) {
                Ok(()) => reply(&mut write, "250 OK").await?,
                Err(e) => {
                    error!(id = %session.id(), from = arg, reason = %e, "MAIL rejected");
                    reply(&mut write, "550 rejected").await?;
                }
            }
        } else if let Some(arg) = upper.strip_prefix("RCPT TO:") {
            let arg = mailbox_argument(command, command.len() - arg.len());
            info!(id = %session.id(), to = arg, "RCPT");
            match session.set_rcpt(arg) {
                Ok(()) => reply(&mut write, "250 OK").await?,
                Err(e) => {
                    error!(id = %session.id(), to = arg, reason = %e, "RCPT rejected");
                    reply(&mut write, "550 rejected").await?;
                }
            }
        } else if upper == "DATA" {
            info!(id = %session.id(), "DATA");
            reply(&mut write, "354 End data with <CR><LF>.<CR><LF>").await?;
            let body = read_data(&mut reader).await?;
            session.set_data(Cursor::new(body));
            match session.commit().await {
                Ok(()) => reply(&mut write, "250 OK: queued").await?,
                Err(e) => {
                    error!(id = %session.id(), reason = %e, "transaction rejected");
                    reply(&mut write, "554 transaction failed").await?;
                }
            }
            session.reset();
        } else if upper == "RSET" {
            info!(id = %session.id(), "RSET");
            session.reset();
            reply(&mut write, "250 OK").await?;
        } else if upper == "NOOP" {
            reply(&mut write, "250 OK").await?;
        } else if upper == "QUIT" {
            info!(id = %session.id(), "QUIT");
            session.reset();
            reply(&mut write, "221 Bye").await?;
            return Ok(());
        } else {
            reply(&mut write, "502 command not implemented").await?;
        }
    }
}

/// Reads the dot-terminated DATA body, undoing dot-stuffing.
///
/// Everything else is kept byte-for-byte as received, so the committed raw
/// message matches what the client sent.
async fn read_data<R: AsyncBufReadExt + Unpin>(reader: &mut R) -> std::io::Result<Vec<u8>> {
    let mut body = Vec::new();
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed during DATA",
            ));
        }
        if line == b".\r\n" || line == b".\n" {
            return Ok(body);
        }
        let unstuffed = line.strip_prefix(b".").unwrap_or(&line);
        body.extend_from_slice(unstuffed);
    }
}

/// Extracts the mailbox from a command argument, tolerating angle brackets
/// and surrounding whitespace. `offset` points past the verb and colon.
fn mailbox_argument(command: &str, offset: usize) -> &str {
    command[offset..]
        .trim()
        .trim_start_matches('<')
        .trim_end_matches('>')
        .trim()
}

async fn reply(write: &mut OwnedWriteHalf, line: &str) -> std::io::Result<()> {
    write.write_all(line.as_bytes()).await?;
    write.write_all(b"\r\n").await
}
