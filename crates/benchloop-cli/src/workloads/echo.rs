//! TCP request/response round trips over loopback.
//!
//! A tokio echo server runs for the lifetime of the workload. Each timed run
//! opens one connection per client thread; clients share a countdown of
//! remaining requests and record the latency of every round trip.

use benchloop_core::concurrent::{claim, worker_count};
use benchloop_core::{LatencyRecorder, Workload};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Runtime;

/// Payload size of one request.
pub const MESSAGE_SIZE: usize = 64;

/// Loopback echo benchmark.
pub struct EchoWorkload {
    runtime: Runtime,
    addr: SocketAddr,
    clients: usize,
}

impl std::fmt::Debug for EchoWorkload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EchoWorkload")
            .field("addr", &self.addr)
            .field("clients", &self.clients)
            .finish_non_exhaustive()
    }
}

impl EchoWorkload {
    /// Start the echo server with one client per CPU.
    pub fn start() -> io::Result<Self> {
        Self::with_clients(worker_count(1))
    }

    /// Start the echo server with `clients` concurrent clients per run.
    pub fn with_clients(clients: usize) -> io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("benchloop-echo")
            .build()?;
        let listener = runtime.block_on(TcpListener::bind("127.0.0.1:0"))?;
        let addr = listener.local_addr()?;
        runtime.spawn(serve(listener));
        tracing::debug!("Echo server listening on {}", addr);
        Ok(Self {
            runtime,
            addr,
            clients: clients.max(1),
        })
    }

    /// Address of the echo server.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

async fn serve(listener: TcpListener) {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                tokio::spawn(echo(stream));
            }
            Err(e) => {
                tracing::warn!("Echo server accept failed: {}", e);
                return;
            }
        }
    }
}

async fn echo(mut stream: TcpStream) {
    let (mut reader, mut writer) = stream.split();
    if let Err(e) = tokio::io::copy(&mut reader, &mut writer).await {
        tracing::debug!("Echo connection closed: {}", e);
    }
}

/// Issue requests until the shared countdown runs out.
async fn client(
    addr: SocketAddr,
    remaining: &AtomicU64,
    recorder: &LatencyRecorder<'_>,
) -> io::Result<u64> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    let request = [0xA5u8; MESSAGE_SIZE];
    let mut response = [0u8; MESSAGE_SIZE];
    let mut completed = 0;

    while claim(remaining) {
        let start = quanta::Instant::now();
        stream.write_all(&request).await?;
        stream.read_exact(&mut response).await?;
        recorder.observe(start);
        completed += 1;
    }
    Ok(completed)
}

impl Workload for EchoWorkload {
    fn run(&mut self, iterations: u64, recorder: &LatencyRecorder<'_>) {
        let handle = self.runtime.handle();
        let remaining = AtomicU64::new(iterations);
        let completed = AtomicU64::new(0);
        let addr = self.addr;

        std::thread::scope(|scope| {
            for _ in 0..self.clients {
                scope.spawn(|| match handle.block_on(client(addr, &remaining, recorder)) {
                    Ok(n) => {
                        completed.fetch_add(n, Ordering::Relaxed);
                    }
                    Err(e) => tracing::warn!("Echo client failed: {}", e),
                });
            }
        });

        let completed = completed.into_inner();
        if completed < iterations {
            tracing::warn!("Echo run completed {} of {} requests", completed, iterations);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use benchloop_core::LatencySampler;

    #[test]
    fn test_round_trips_recorded() {
        let mut workload = EchoWorkload::with_clients(3).unwrap();
        let mut sampler = LatencySampler::with_capacity(1000);

        workload.run(200, &sampler.recorder());

        let latency = sampler.percentiles().unwrap();
        assert_eq!(latency.count, 200);
        assert!(latency.p50 > 0);
        assert!(latency.p99 >= latency.p50);
    }

    #[test]
    fn test_zero_iterations() {
        let mut workload = EchoWorkload::with_clients(2).unwrap();
        let sampler = LatencySampler::with_capacity(10);
        workload.run(0, &sampler.recorder());
        assert!(sampler.is_empty());
    }
}
