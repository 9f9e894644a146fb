//! Drives a processor against the sub-processor drivers.
//!
//! The outer connection loop owns a LIFO of processors; this module is the
//! small piece of it the preparation core needs: pop the pushed sub-processor
//! request, run it to completion, deliver the completion, and run the
//! cancellable retry timer.

use tokio::sync::Notify;
use tokio::time::sleep;

use crate::connection::Connection;
use crate::errors::Error;

use super::handlers::ResultSink;
use super::subprocess::{Completion, SubProcessorRequest, SubProcessors};
use super::{Processed, Processor};

/// Run `processor` to completion.
pub async fn drive<P, D>(
    processor: &mut P,
    conn: &mut Connection,
    driver: &mut D,
    cancel: &Notify,
) -> Result<(), Error>
where
    P: Processor,
    D: SubProcessors + Send,
{
    loop {
        match processor.process(conn)? {
            Processed::Again => {}
            Processed::Suspend => {
                if let Some(request) = conn.take_pending() {
                    dispatch(request, conn, driver).await;
                } else if let Some(delay) = conn.take_wake_after() {
                    tokio::select! {
                        _ = sleep(delay) => {}
                        _ = cancel.notified() => conn.deliver(Completion::Cancelled),
                    }
                }
            }
            Processed::SendToClient => {
                driver
                    .flush_to_client(conn)
                    .await
                    .map_err(Error::ClientFlush)?;
            }
            Processed::Done => return Ok(()),
        }
    }
}

async fn dispatch<D>(request: SubProcessorRequest, conn: &mut Connection, driver: &mut D)
where
    D: SubProcessors + Send,
{
    let completion = match request {
        SubProcessorRequest::Connect => Completion::SubProcessor(driver.connect(conn).await),
        SubProcessorRequest::ServerGreeting { in_handshake } => {
            Completion::SubProcessor(driver.server_greeting(conn, in_handshake).await)
        }
        SubProcessorRequest::ChangeUser { in_handshake } => {
            Completion::SubProcessor(driver.change_user(conn, in_handshake).await)
        }
        SubProcessorRequest::ResetConnection => {
            Completion::SubProcessor(driver.reset_connection(conn).await)
        }
        SubProcessorRequest::SetOption(option) => {
            Completion::SubProcessor(driver.set_option(conn, option).await)
        }
        SubProcessorRequest::InitSchema { schema } => {
            Completion::SubProcessor(driver.init_schema(conn, &schema).await)
        }
        SubProcessorRequest::Query { stmt, handler } => {
            let mut sink = ResultSink::new(handler);
            driver.query(conn, &stmt, &mut sink).await;
            Completion::Query(sink.finish())
        }
        SubProcessorRequest::Quit => Completion::SubProcessor(driver.quit(conn).await),
        SubProcessorRequest::FetchRouterRequires => {
            Completion::RouterRequires(driver.fetch_router_requires(conn).await)
        }
    };
    conn.deliver(completion);
}
