#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use text2sql_agent::db::{
    initialize_database, DataStore, SqliteStore, StatementInterrupt, StatementOutput, StoreConnection, CSV_TABLES,
};
use text2sql_agent::error::{AgentError, Result};
use text2sql_agent::llm::LanguageModel;
use text2sql_agent::responses::ResponseShape;

/// Deterministic model double. Replies are queued per response shape; the
/// last queued reply keeps being returned once the queue is drained.
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<HashMap<String, VecDeque<Value>>>,
    failing: HashSet<String>,
    calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, shape: &str, value: Value) -> Self {
        self.replies
            .lock()
            .unwrap()
            .entry(shape.to_string())
            .or_default()
            .push_back(value);
        self
    }

    pub fn fail(mut self, shape: &str) -> Self {
        self.failing.insert(shape.to_string());
        self
    }

    pub fn calls(&self, shape: &str) -> usize {
        self.calls.lock().unwrap().get(shape).copied().unwrap_or(0)
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn invoke(&self, _prompt: &str, shape: &ResponseShape) -> Result<Value> {
        *self.calls.lock().unwrap().entry(shape.name.to_string()).or_default() += 1;
        if self.failing.contains(shape.name) {
            return Err(AgentError::Llm(format!("backend unavailable for {}", shape.name)));
        }

        let mut replies = self.replies.lock().unwrap();
        let queue = replies
            .get_mut(shape.name)
            .ok_or_else(|| AgentError::Llm(format!("no scripted reply for {}", shape.name)))?;
        let reply = if queue.len() > 1 { queue.pop_front() } else { queue.front().cloned() };
        reply.ok_or_else(|| AgentError::Llm(format!("no scripted reply for {}", shape.name)))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Counts connections and closes of any wrapped store.
pub struct CountingStore<S> {
    inner: S,
    pub connects: Arc<AtomicUsize>,
    pub closes: Arc<AtomicUsize>,
}

impl<S: DataStore> CountingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            connects: Arc::new(AtomicUsize::new(0)),
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

struct CountingConnection {
    inner: Box<dyn StoreConnection>,
    closes: Arc<AtomicUsize>,
    closed: bool,
}

impl StoreConnection for CountingConnection {
    fn execute(&mut self, sql: &str) -> std::result::Result<StatementOutput, String> {
        self.inner.execute(sql)
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.close();
    }

    fn interrupt_handle(&self) -> Option<Arc<dyn StatementInterrupt>> {
        self.inner.interrupt_handle()
    }
}

impl<S: DataStore> DataStore for CountingStore<S> {
    fn connect(&self) -> Result<Box<dyn StoreConnection>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountingConnection {
            inner: self.inner.connect()?,
            closes: self.closes.clone(),
            closed: false,
        }))
    }
}

/// Misbehaving store: fails the first `failures` executions with an engine
/// error, and can be made to stall or panic instead. A stall ends early when
/// the connection is interrupted.
pub struct FaultyStore {
    pub failures: usize,
    pub error: String,
    pub stall: Option<Duration>,
    pub panic: bool,
    executions: Arc<AtomicUsize>,
}

impl FaultyStore {
    pub fn failing(failures: usize, error: &str) -> Self {
        Self {
            failures,
            error: error.to_string(),
            stall: None,
            panic: false,
            executions: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn always_failing(error: &str) -> Self {
        Self::failing(usize::MAX, error)
    }

    pub fn stalling(stall: Duration) -> Self {
        Self {
            stall: Some(stall),
            ..Self::failing(0, "")
        }
    }

    pub fn panicking() -> Self {
        Self {
            panic: true,
            ..Self::failing(0, "")
        }
    }
}

struct FaultyConnection {
    failures: usize,
    error: String,
    stall: Option<Duration>,
    panic: bool,
    executions: Arc<AtomicUsize>,
    interrupted: Arc<AtomicBool>,
}

struct InterruptFlag(Arc<AtomicBool>);

impl StatementInterrupt for InterruptFlag {
    fn interrupt(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl StoreConnection for FaultyConnection {
    fn execute(&mut self, _sql: &str) -> std::result::Result<StatementOutput, String> {
        if self.panic {
            panic!("driver crashed");
        }
        if let Some(stall) = self.stall {
            let started = std::time::Instant::now();
            while started.elapsed() < stall {
                if self.interrupted.load(Ordering::SeqCst) {
                    return Err("interrupted".to_string());
                }
                std::thread::sleep(Duration::from_millis(5));
            }
        }
        let n = self.executions.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            return Err(self.error.clone());
        }
        Ok(StatementOutput {
            columns: vec!["n".to_string()],
            rows: vec![vec![text2sql_agent::state::CellValue::Integer(1)]],
        })
    }

    fn close(&mut self) {}

    fn interrupt_handle(&self) -> Option<Arc<dyn StatementInterrupt>> {
        Some(Arc::new(InterruptFlag(self.interrupted.clone())))
    }
}

impl DataStore for FaultyStore {
    fn connect(&self) -> Result<Box<dyn StoreConnection>> {
        Ok(Box::new(FaultyConnection {
            failures: self.failures,
            error: self.error.clone(),
            stall: self.stall,
            panic: self.panic,
            executions: self.executions.clone(),
            interrupted: Arc::new(AtomicBool::new(false)),
        }))
    }
}

fn csv_body(table: &str) -> String {
    match table {
        "products" => {
            let mut body = String::from("id,name,category,brand,retail_price\n");
            let items = [
                ("Denim Jacket", "Outerwear", 120.0),
                ("Wool Coat", "Outerwear", 250.0),
                ("Running Shoes", "Shoes", 90.0),
                ("Silk Scarf", "Accessories", 45.0),
                ("Leather Belt", "Accessories", 35.0),
                ("Cotton Socks", "Socks", 8.0),
            ];
            for (i, (name, category, price)) in items.iter().enumerate() {
                body.push_str(&format!("{},{},{},Acme,{}\n", i + 1, name, category, price));
            }
            body
        }
        "order_items" => {
            // product_id, sale_price pairs; product 2 sells best, product 6 least
            let sales = [
                (1, 110.0),
                (1, 115.0),
                (2, 240.0),
                (2, 245.0),
                (3, 85.0),
                (4, 40.0),
                (4, 42.0),
                (5, 30.0),
                (6, 7.5),
            ];
            let mut body = String::from("id,order_id,user_id,product_id,status,sale_price\n");
            for (i, (product, price)) in sales.iter().enumerate() {
                body.push_str(&format!("{},{},{},{},Complete,{}\n", i + 1, 100 + i, 1, product, price));
            }
            body
        }
        "users" => "id,first_name,state\n1,Ada,California\n".to_string(),
        "orders" => "order_id,user_id,status\n100,1,Complete\n".to_string(),
        _ => "id,name\n1,sample\n".to_string(),
    }
}

/// Build the SQLite fixture through the dataset loader.
pub fn seeded_database(dir: &Path) -> PathBuf {
    let data_dir = dir.join("data");
    std::fs::create_dir_all(&data_dir).unwrap();
    for (table, file) in CSV_TABLES.iter() {
        std::fs::write(data_dir.join(file), csv_body(table)).unwrap();
    }
    let db_path = dir.join("db_data").join("ecommerce.db");
    initialize_database(&data_dir, &db_path, false).unwrap();
    db_path
}

pub fn seeded_store(dir: &Path) -> SqliteStore {
    SqliteStore::new(seeded_database(dir))
}
