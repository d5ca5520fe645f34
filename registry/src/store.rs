//! A sled tree of bincode-encoded records keyed by id.

use attest_protocol::ledger::LedgerStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::Tree;

use crate::RegistryResult;

#[derive(Debug, Clone)]
pub(crate) struct RecordTree {
    tree: Tree,
}

impl RecordTree {
    pub(crate) fn open(store: &LedgerStore, name: &str) -> RegistryResult<Self> {
        Ok(Self {
            tree: store.open_tree(name)?,
        })
    }

    /// Write `record` under `id` and flush.
    pub(crate) fn put<T: Serialize>(&self, id: &str, record: &T) -> RegistryResult<()> {
        let bytes = bincode::serialize(record)?;
        self.tree.insert(id.as_bytes(), bytes)?;
        self.tree.flush()?;
        Ok(())
    }

    pub(crate) fn load_all<T: DeserializeOwned>(&self) -> RegistryResult<Vec<T>> {
        let mut records = Vec::with_capacity(self.tree.len());
        for entry in self.tree.iter() {
            let (_key, value) = entry?;
            records.push(bincode::deserialize(&value)?);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Rec {
        id: String,
        n: Option<u32>,
    }

    #[test]
    fn put_and_load() {
        let store = LedgerStore::open_temporary().unwrap();
        let tree = RecordTree::open(&store, "records").unwrap();
        tree.put("b", &Rec { id: "b".into(), n: None }).unwrap();
        tree.put("a", &Rec { id: "a".into(), n: Some(1) }).unwrap();

        let all: Vec<Rec> = tree.load_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0], Rec { id: "a".into(), n: Some(1) });
    }

    #[test]
    fn put_overwrites() {
        let store = LedgerStore::open_temporary().unwrap();
        let tree = RecordTree::open(&store, "records").unwrap();
        tree.put("a", &Rec { id: "a".into(), n: Some(1) }).unwrap();
        tree.put("a", &Rec { id: "a".into(), n: Some(2) }).unwrap();

        let all: Vec<Rec> = tree.load_all().unwrap();
        assert_eq!(all, vec![Rec { id: "a".into(), n: Some(2) }]);
    }
}
