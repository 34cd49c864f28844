/// Cluster diagnostics printed after a successful bootstrap
use crate::driver::{ClusterSession, QueryResult};
use crate::error::PasarelaResult;
use std::io::Write;

pub const LOCAL_DIAGNOSTIC_QUERY: &str =
    "SELECT data_center, rack, host_id, release_version FROM system.local";
pub const PEERS_DIAGNOSTIC_QUERY: &str =
    "SELECT data_center, rack, host_id, release_version FROM system.peers";

/// Print the discovered nodes and both diagnostic queries, then close the session
///
/// The session is closed even when a query or a write fails.
pub async fn run_diagnostics(session: &dyn ClusterSession, out: &mut dyn Write) -> PasarelaResult<()> {
    let result = write_report(session, out).await;
    session.close().await;
    result
}

async fn write_report(session: &dyn ClusterSession, out: &mut dyn Write) -> PasarelaResult<()> {
    writeln!(out, "Discovered Nodes")?;
    for node in session.nodes().await {
        writeln!(out, "{}", node)?;
    }
    writeln!(out)?;

    let local = session.execute(LOCAL_DIAGNOSTIC_QUERY).await?;
    write_result(out, &local)?;
    writeln!(out)?;

    let peers = session.execute(PEERS_DIAGNOSTIC_QUERY).await?;
    write_result(out, &peers)?;

    out.flush()?;
    Ok(())
}

fn write_result(out: &mut dyn Write, result: &QueryResult) -> PasarelaResult<()> {
    writeln!(out, "Coordinator: {}", result.coordinator)?;
    for row in &result.rows {
        writeln!(out, "{}", row)?;
    }
    Ok(())
}
