use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};

use bayuncore::{
    BufferPoolConfig, BufferPoolManager, Catalog, HeapFile, TableId, Transaction,
    TransactionError, Tuple,
};

const TABLE_ID: TableId = 1;

#[derive(Parser)]
#[command(author, version, about = "Bayun storage core - concurrent transaction driver")]
struct Cli {
    /// Directory holding the table file
    #[arg(short, long, default_value = "bayun_data")]
    dir: PathBuf,

    /// Buffer pool size (number of pages)
    #[arg(short, long, default_value_t = 50)]
    pool_size: usize,

    /// Page size in bytes
    #[arg(long, default_value_t = 4096)]
    page_size: usize,

    /// Command to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run concurrent insert transactions, retrying deadlock victims
    Run {
        /// Number of worker threads
        #[arg(short, long, default_value_t = 4)]
        threads: usize,

        /// Transactions per thread
        #[arg(short = 'n', long, default_value_t = 100)]
        txns: usize,

        /// Tuples inserted by each transaction
        #[arg(long, default_value_t = 3)]
        tuples_per_txn: usize,
    },

    /// Count the tuples stored in the table
    Scan,
}

#[derive(Debug, Default, Clone, Copy)]
struct WorkerStats {
    committed: usize,
    aborted: usize,
}

fn open(cli: &Cli) -> Result<(Arc<BufferPoolManager>, Arc<HeapFile>)> {
    std::fs::create_dir_all(&cli.dir)
        .with_context(|| format!("creating {}", cli.dir.display()))?;

    let heap = Arc::new(HeapFile::create(
        cli.dir.join(format!("table_{}.dat", TABLE_ID)),
        TABLE_ID,
        cli.page_size,
    )?);
    let catalog = Arc::new(Catalog::new());
    catalog.add_table(heap.clone());

    let config = BufferPoolConfig {
        pool_size: cli.pool_size,
        page_size: cli.page_size,
        ..BufferPoolConfig::default()
    };
    let pool = Arc::new(BufferPoolManager::new(config, catalog)?);

    Ok((pool, heap))
}

fn insert_batch(txn: &Transaction, worker: usize, batch: usize, tuples: usize) -> Result<(), TransactionError> {
    for i in 0..tuples {
        let mut tuple = Tuple::new(format!("worker={} batch={} row={}", worker, batch, i));
        txn.insert_tuple(TABLE_ID, &mut tuple)?;
    }
    Ok(())
}

fn run_worker(pool: &Arc<BufferPoolManager>, worker: usize, txns: usize, tuples: usize) -> Result<WorkerStats> {
    let mut stats = WorkerStats::default();

    for batch in 0..txns {
        loop {
            let mut txn = Transaction::begin(Arc::clone(pool));
            match insert_batch(&txn, worker, batch, tuples) {
                Ok(()) => {
                    txn.commit()?;
                    stats.committed += 1;
                    break;
                }
                Err(err) if err.is_deadlock() => {
                    txn.abort()?;
                    stats.aborted += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    Ok(stats)
}

fn count_tuples(pool: &Arc<BufferPoolManager>, heap: &HeapFile) -> Result<usize> {
    let mut txn = Transaction::begin(Arc::clone(pool));
    let tuples = heap.scan(pool, txn.id())?;
    txn.commit()?;
    Ok(tuples.len())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let (pool, heap) = open(&cli)?;

    match cli.command {
        Commands::Run { threads, txns, tuples_per_txn } => {
            let started = Instant::now();

            let results: Vec<Result<WorkerStats>> = crossbeam::thread::scope(|s| {
                let handles: Vec<_> = (0..threads)
                    .map(|worker| {
                        let pool = &pool;
                        s.spawn(move |_| run_worker(pool, worker, txns, tuples_per_txn))
                    })
                    .collect();

                handles
                    .into_iter()
                    .map(|handle| handle.join().unwrap_or_else(|_| Err(anyhow!("worker thread panicked"))))
                    .collect()
            })
            .map_err(|_| anyhow!("worker scope panicked"))?;

            let mut total = WorkerStats::default();
            for stats in results {
                let stats = stats?;
                total.committed += stats.committed;
                total.aborted += stats.aborted;
            }

            println!("Committed transactions: {}", total.committed);
            println!("Deadlock aborts (retried): {}", total.aborted);
            println!("Elapsed: {:.2?}", started.elapsed());
            println!("Tuples in table: {}", count_tuples(&pool, &heap)?);
        }
        Commands::Scan => {
            println!("Tuples in table: {}", count_tuples(&pool, &heap)?);
        }
    }

    Ok(())
}
