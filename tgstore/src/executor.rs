//! Execution adapter — the one thread that touches the SQLite connection.
//!
//! `rusqlite::Connection` is blocking and must not be shared between threads,
//! so it lives on a dedicated worker. Async callers hand it boxed jobs through
//! a single-slot queue and await the reply on a oneshot channel. Jobs run one
//! at a time in arrival order, which makes every store operation atomic with
//! respect to every other one.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread;

use rusqlite::Connection;
use tokio::sync::{mpsc, oneshot};

use crate::errors::StoreError;

type Job = Box<dyn FnOnce(&mut Connection) + Send>;

enum Command {
    Run(Job),
    Close(oneshot::Sender<Result<(), StoreError>>),
}

/// Handle to the worker thread. Cheap to clone; all clones share one queue.
#[derive(Clone)]
pub(crate) struct Executor {
    tx: mpsc::Sender<Command>,
}

impl Executor {
    /// Move `conn` onto a new worker thread named `name`.
    pub(crate) fn spawn(conn: Connection, name: &str) -> Result<Self, StoreError> {
        let (tx, rx) = mpsc::channel(1);
        thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker_loop(conn, rx))?;
        Ok(Self { tx })
    }

    /// Run `f` on the worker and wait for its result.
    pub(crate) async fn run<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move |conn| {
            // A panic unwinds through any open transaction, which rolls it back.
            let result = panic::catch_unwind(AssertUnwindSafe(|| f(conn))).unwrap_or_else(|payload| {
                let msg = panic_message(&*payload);
                tracing::error!("[tgstore] operation panicked: {msg}");
                Err(StoreError::WorkerPanicked(msg))
            });
            let _ = reply_tx.send(result);
        });
        self.tx.send(Command::Run(job)).await.map_err(|_| StoreError::Closed)?;
        // A dropped reply sender means the job was discarded by a close.
        reply_rx.await.map_err(|_| StoreError::Closed)?
    }

    /// Close the connection and stop the worker.
    ///
    /// Jobs queued behind the close are dropped and their callers see
    /// [`StoreError::Closed`]. Closing twice is a no-op.
    pub(crate) async fn close(&self) -> Result<(), StoreError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send(Command::Close(reply_tx)).await.is_err() {
            return Ok(());
        }
        reply_rx.await.map_err(|_| StoreError::Closed)?
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

fn worker_loop(mut conn: Connection, mut rx: mpsc::Receiver<Command>) {
    tracing::trace!("[tgstore] worker started");
    while let Some(cmd) = rx.blocking_recv() {
        match cmd {
            Command::Run(job) => job(&mut conn),
            Command::Close(reply) => {
                rx.close();
                let result = conn.close().map_err(|(_, e)| StoreError::Sqlite(e));
                let _ = reply.send(result);
                tracing::debug!("[tgstore] worker stopped");
                return;
            }
        }
    }
    // Every handle was dropped without an explicit close.
    if let Err((_, e)) = conn.close() {
        tracing::warn!("[tgstore] closing connection on drop failed: {e}");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_jobs_in_order_and_refuses_after_close() {
        let conn = Connection::open_in_memory().unwrap();
        let exec = Executor::spawn(conn, "tgstore-test").unwrap();

        exec.run(|c| Ok(c.execute_batch("CREATE TABLE t (n INTEGER)")?)).await.unwrap();
        for n in 0..5 {
            exec.run(move |c| Ok(c.execute("INSERT INTO t VALUES (?1)", [n])?)).await.unwrap();
        }
        let seen: Vec<i64> = exec.run(|c| {
            let mut stmt = c.prepare("SELECT n FROM t ORDER BY rowid")?;
            let rows = stmt.query_map([], |r| r.get::<_, i64>(0))?.collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        }).await.unwrap();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);

        exec.close().await.unwrap();
        assert!(exec.is_closed());
        let err = exec.run(|_| Ok(())).await.unwrap_err();
        assert!(matches!(err, StoreError::Closed));
        // Second close is harmless.
        exec.close().await.unwrap();
    }

    #[tokio::test]
    async fn panicking_job_is_reported_and_worker_survives() {
        let conn = Connection::open_in_memory().unwrap();
        let exec = Executor::spawn(conn, "tgstore-test").unwrap();
        exec.run(|c| Ok(c.execute_batch("CREATE TABLE t (n INTEGER)")?)).await.unwrap();

        let err = exec
            .run(|c| -> Result<(), StoreError> {
                let tx = c.transaction()?;
                tx.execute("INSERT INTO t VALUES (1)", [])?;
                panic!("boom");
            })
            .await
            .unwrap_err();
        assert!(matches!(&err, StoreError::WorkerPanicked(msg) if msg == "boom"), "{err}");
        assert!(!exec.is_closed());

        let n: i64 = exec
            .run(|c| Ok(c.query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0))?))
            .await
            .unwrap();
        assert_eq!(n, 0, "the panicked transaction was rolled back");
        exec.close().await.unwrap();
    }
}
