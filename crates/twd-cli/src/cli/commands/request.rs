//! Commands that forward one request to the daemon and print its answer.

use anyhow::{bail, Result};
use twd_core::control::{default_control_socket_path, ControlRequest, ControlResponse};

use crate::cli::control_socket;

pub async fn run_request(req: ControlRequest) -> Result<()> {
    let path = default_control_socket_path()?;
    let resp = control_socket::send_request(&path, &req).await?;
    print_response(&resp)
}

fn print_response(resp: &ControlResponse) -> Result<()> {
    match resp {
        ControlResponse::Ack { success, message } => {
            let verdict = if *success { "ok" } else { "nothing to do" };
            match message {
                Some(m) => println!("{}: {}", verdict, m),
                None => println!("{}", verdict),
            }
        }
        ControlResponse::SearchParams { params } => {
            println!("board:         {}", params.board);
            println!("search term:   {}", params.search_term);
            println!("download path: {}", params.download_path);
        }
        ControlResponse::Status { status } => {
            println!("{}", serde_json::to_string_pretty(status)?);
        }
        ControlResponse::Error { message } => bail!("{}", message),
    }
    Ok(())
}
