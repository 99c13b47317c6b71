//! Interactive approval prompts on the terminal

use async_trait::async_trait;
use specloop_core::models::workflow::ApprovalRequest;
use specloop_core::workflow::ApprovalGateway;
use specloop_core::ApprovalError;
use std::io::{self, BufRead, Write};

/// Prompts on stderr and reads the answer from stdin
///
/// End of input counts as a closed gateway.
pub struct TerminalApprovalGateway;

#[async_trait]
impl ApprovalGateway for TerminalApprovalGateway {
    async fn request(&self, request: &ApprovalRequest) -> Result<String, ApprovalError> {
        eprintln!();
        eprintln!("⏸️  {}", request.message);
        for (i, option) in request.options.iter().enumerate() {
            eprintln!("   {}. {}", i + 1, option);
        }

        loop {
            eprint!("Choose [1-{}]: ", request.options.len());
            let _ = io::stderr().flush();

            let line = read_line().await.map_err(|e| {
                tracing::warn!("Failed to read approval answer: {}", e);
                ApprovalError::Closed
            })?;
            let Some(line) = line else {
                return Err(ApprovalError::Closed);
            };

            match resolve_choice(&line, &request.options) {
                Some(choice) => return Ok(choice),
                None => {
                    eprintln!("⚠️  Enter a number or one of: {}", request.options.join(", "))
                }
            }
        }
    }
}

/// Map an answer to an option, by 1-based number or case-insensitive text
pub fn resolve_choice(input: &str, options: &[String]) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    if let Ok(number) = input.parse::<usize>() {
        return number
            .checked_sub(1)
            .and_then(|i| options.get(i))
            .cloned();
    }
    options
        .iter()
        .find(|option| option.eq_ignore_ascii_case(input))
        .cloned()
}

/// Read one line from stdin, `None` at end of input
async fn read_line() -> io::Result<Option<String>> {
    tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        let read = io::stdin().lock().read_line(&mut line)?;
        Ok(if read == 0 { None } else { Some(line) })
    })
    .await
    .map_err(io::Error::other)?
}
