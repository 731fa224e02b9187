use crate::domain::ids::{OrderId, OrderNumber};
use crate::domain::order::Order;
use crate::domain::ports::{OrderStore, Versioned};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Column Family for order documents, keyed by order id.
pub const CF_ORDERS: &str = "orders";
/// Column Family mapping order numbers to order ids.
pub const CF_ORDER_NUMBERS: &str = "order_numbers";

#[derive(Serialize, Deserialize)]
struct StoredOrder {
    version: u64,
    order: Order,
}

impl From<StoredOrder> for Versioned<Order> {
    fn from(stored: StoredOrder) -> Self {
        Versioned {
            data: stored.order,
            version: stored.version,
        }
    }
}

/// A persistent order store using RocksDB.
///
/// Orders are stored as JSON next to their version stamp. Reads are lock-free;
/// inserts and swaps take a process-wide write lock so the version check and the
/// write cannot interleave.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the "orders" and "order_numbers" column families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_orders = ColumnFamilyDescriptor::new(CF_ORDERS, Options::default());
        let cf_numbers = ColumnFamilyDescriptor::new(CF_ORDER_NUMBERS, Options::default());

        let db = DB::open_cf_descriptors(&opts, path, vec![cf_orders, cf_numbers])?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            LedgerError::Internal(Box::new(std::io::Error::other(format!(
                "{name} column family not found"
            ))))
        })
    }

    fn read(&self, id: &OrderId) -> Result<Option<StoredOrder>> {
        let cf = self.cf(CF_ORDERS)?;
        match self.db.get_cf(cf, id.as_uuid().as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.write_lock.lock().map_err(|_| {
            LedgerError::Internal(Box::new(std::io::Error::other("write lock poisoned")))
        })
    }
}

#[async_trait]
impl OrderStore for RocksDBStore {
    async fn insert(&self, order: Order) -> Result<Versioned<Order>> {
        let _guard = self.lock()?;
        let numbers = self.cf(CF_ORDER_NUMBERS)?;
        let orders = self.cf(CF_ORDERS)?;

        let number_key = order.order_number.as_str().as_bytes().to_vec();
        if self.db.get_pinned_cf(numbers, &number_key)?.is_some() {
            return Err(LedgerError::Conflict {
                order_number: order.order_number.to_string(),
                expected: 0,
                actual: 1,
            });
        }

        let stored = StoredOrder { version: 1, order };
        let mut batch = WriteBatch::default();
        batch.put_cf(
            orders,
            stored.order.id.as_uuid().as_bytes(),
            serde_json::to_vec(&stored)?,
        );
        batch.put_cf(numbers, &number_key, stored.order.id.as_uuid().as_bytes());
        self.db.write(batch)?;

        Ok(stored.into())
    }

    async fn get(&self, id: &OrderId) -> Result<Option<Versioned<Order>>> {
        Ok(self.read(id)?.map(Into::into))
    }

    async fn get_by_number(&self, number: &OrderNumber) -> Result<Option<Versioned<Order>>> {
        let numbers = self.cf(CF_ORDER_NUMBERS)?;
        let Some(id_bytes) = self.db.get_cf(numbers, number.as_str().as_bytes())? else {
            return Ok(None);
        };
        let uuid = uuid::Uuid::from_slice(&id_bytes)
            .map_err(|e| LedgerError::Internal(Box::new(e)))?;
        Ok(self.read(&OrderId::from_uuid(uuid))?.map(Into::into))
    }

    async fn compare_and_swap(
        &self,
        order: Order,
        expected_version: u64,
    ) -> Result<Versioned<Order>> {
        let _guard = self.lock()?;
        let current = self
            .read(&order.id)?
            .ok_or_else(|| LedgerError::not_found(format!("order {}", order.order_number)))?;
        if current.version != expected_version {
            return Err(LedgerError::Conflict {
                order_number: order.order_number.to_string(),
                expected: expected_version,
                actual: current.version,
            });
        }

        let stored = StoredOrder {
            version: expected_version + 1,
            order,
        };
        let cf = self.cf(CF_ORDERS)?;
        self.db.put_cf(
            cf,
            stored.order.id.as_uuid().as_bytes(),
            serde_json::to_vec(&stored)?,
        )?;
        Ok(stored.into())
    }

    async fn all(&self) -> Result<Vec<Versioned<Order>>> {
        let cf = self.cf(CF_ORDERS)?;
        let mut orders = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            let stored: StoredOrder = serde_json::from_slice(&value)?;
            orders.push(stored.into());
        }
        Ok(orders)
    }
}
