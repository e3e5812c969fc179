//! In-memory NCBI taxonomy built from a `nodes.dmp` / `names.dmp` pair.
//!
//! Both files use the taxdump layout: fields separated by `|`, padded with tabs.
//! The name index groups every scientific, equivalent and synonym name by the
//! rank of the node it names, which is the candidate pool the OTU resolver
//! fuzzy-matches against.
use fnv::FnvHashMap;
use log::{debug, info};
use std::{io::BufRead, path::Path};

use crate::_files::open_text;
use crate::error::{MbError, Result};

pub type Txid = u32;

/// Taxid of the taxonomy root. Its parent is itself.
pub const ROOT: Txid = 1;

const INDEXED_NAME_CLASSES: [&str; 3] = ["scientific name", "equivalent name", "synonym"];

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub parent: Txid,
    pub rank: String,
    /// Scientific name, if `names.dmp` carried one.
    pub name: Option<String>,
}

/// Names of one rank, in first-seen order.
#[derive(Debug, Default, Clone)]
pub struct RankNames {
    entries: Vec<(String, Txid)>,
    positions: FnvHashMap<String, usize>,
}

impl RankNames {
    /// Add a name. A repeated name keeps its position and takes the newer taxid.
    pub fn insert(&mut self, name: &str, txid: Txid) {
        match self.positions.get(name) {
            Some(&i) => self.entries[i].1 = txid,
            None => {
                self.positions.insert(name.to_owned(), self.entries.len());
                self.entries.push((name.to_owned(), txid));
            }
        }
    }

    #[cfg(test)]
    pub fn get(&self, name: &str) -> Option<Txid> {
        self.positions.get(name).map(|&i| self.entries[i].1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Txid)> {
        self.entries.iter().map(|(n, t)| (n.as_str(), *t))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct Taxonomy {
    nodes: FnvHashMap<Txid, Node>,
    names: FnvHashMap<String, RankNames>,
}

fn dmp_fields(line: &str) -> Vec<&str> {
    line.split('|').map(str::trim).collect()
}

fn parse_txid(field: &str, path: &Path, line: usize) -> Result<Txid> {
    field.parse().map_err(|_| MbError::MalformedLine {
        path: path.to_path_buf(),
        line,
        msg: format!("{:?} is not a taxid", field),
    })
}

impl Taxonomy {
    /// Load the taxonomy from a `nodes.dmp` and a `names.dmp` file (plain or gzipped).
    pub fn from_dump(nodes_path: &Path, names_path: &Path) -> Result<Self> {
        let mut taxonomy = Taxonomy::default();
        taxonomy.read_nodes(open_text(nodes_path)?, nodes_path)?;
        debug!("Read {} nodes from {:?}", taxonomy.nodes.len(), nodes_path);
        taxonomy.read_names(open_text(names_path)?, names_path)?;
        info!(
            "Created NCBI txid database: {} nodes, {} ranks indexed",
            taxonomy.len(),
            taxonomy.names.len()
        );
        Ok(taxonomy)
    }

    fn read_nodes<R: BufRead>(&mut self, reader: R, path: &Path) -> Result<()> {
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let fields = dmp_fields(&line);
            if fields.len() < 3 {
                return Err(MbError::MalformedLine {
                    path: path.to_path_buf(),
                    line: i + 1,
                    msg: "expected at least 3 fields".to_owned(),
                });
            }
            let txid = parse_txid(fields[0], path, i + 1)?;
            let parent = parse_txid(fields[1], path, i + 1)?;
            self.nodes.insert(
                txid,
                Node {
                    parent,
                    rank: fields[2].to_owned(),
                    name: None,
                },
            );
        }
        Ok(())
    }

    fn read_names<R: BufRead>(&mut self, reader: R, path: &Path) -> Result<()> {
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let fields = dmp_fields(&line);
            if fields.len() < 4 {
                return Err(MbError::MalformedLine {
                    path: path.to_path_buf(),
                    line: i + 1,
                    msg: "expected at least 4 fields".to_owned(),
                });
            }
            let name_class = fields[3];
            if !INDEXED_NAME_CLASSES.contains(&name_class) {
                continue;
            }
            let txid = parse_txid(fields[0], path, i + 1)?;
            let name = fields[1];
            let node = self
                .nodes
                .get_mut(&txid)
                .ok_or(MbError::UnknownTaxid(txid))?;
            if name_class == "scientific name" {
                node.name = Some(name.to_owned());
            }
            self.names
                .entry(node.rank.clone())
                .or_default()
                .insert(name, txid);
        }
        Ok(())
    }

    pub fn node(&self, txid: Txid) -> Option<&Node> {
        self.nodes.get(&txid)
    }

    /// Scientific name of `txid`, falling back to the taxid itself.
    pub fn name_of(&self, txid: Txid) -> String {
        self.nodes
            .get(&txid)
            .and_then(|n| n.name.clone())
            .unwrap_or_else(|| txid.to_string())
    }

    /// Candidate names for `rank`, if any node of that rank was named.
    pub fn names(&self, rank: &str) -> Option<&RankNames> {
        self.names.get(rank)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Ancestor chain of `txid`, starting with `txid` itself and ending at [`ROOT`].
    pub fn lineage(&self, txid: Txid) -> Result<Vec<Txid>> {
        if !self.nodes.contains_key(&txid) {
            return Err(MbError::BrokenLineage {
                txid,
                msg: "taxid is not in nodes.dmp".to_owned(),
            });
        }
        let mut chain = vec![txid];
        let mut current = txid;
        while current != ROOT {
            // chain can never be longer than the node count without a cycle
            if chain.len() > self.nodes.len() {
                return Err(MbError::BrokenLineage {
                    txid,
                    msg: "parent chain loops".to_owned(),
                });
            }
            let parent = self.nodes[&current].parent;
            if !self.nodes.contains_key(&parent) {
                return Err(MbError::BrokenLineage {
                    txid,
                    msg: format!("parent {} of {} is not in nodes.dmp", parent, current),
                });
            }
            chain.push(parent);
            current = parent;
        }
        Ok(chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::path::PathBuf;

    fn fixture() -> Taxonomy {
        Taxonomy::from_dump(
            &PathBuf::from("tests/nodes.dmp"),
            &PathBuf::from("tests/names.dmp"),
        )
        .unwrap()
    }

    #[test]
    fn test_load_fixture() {
        let tax = fixture();
        assert_eq!(tax.len(), 21);
        let ecoli = tax.node(562).unwrap();
        assert_eq!(ecoli.rank, "species");
        assert_eq!(ecoli.parent, 561);
        assert_eq!(ecoli.name.as_deref(), Some("Escherichia coli"));
    }

    #[test]
    fn test_name_index_by_rank() {
        let tax = fixture();
        let phyla = tax.names("phylum").unwrap();
        assert_eq!(phyla.get("Pseudomonadota"), Some(1224));
        // synonyms are indexed under the rank of their node
        assert_eq!(phyla.get("Proteobacteria"), Some(1224));
        let species = tax.names("species").unwrap();
        assert_eq!(species.get("Bacterium coli"), Some(562));
        // common names are not indexed
        assert_eq!(species.get("E. coli"), None);
    }

    #[test]
    fn test_lineage_ends_at_root() {
        let tax = fixture();
        for txid in [1, 2, 562, 83333, 1423, 4932] {
            let chain = tax.lineage(txid).unwrap();
            assert_eq!(chain.first(), Some(&txid));
            assert_eq!(chain.last(), Some(&ROOT));
        }
        assert_eq!(
            tax.lineage(562).unwrap(),
            vec![562, 561, 543, 91347, 1236, 1224, 2, 131567, 1]
        );
        assert_eq!(tax.lineage(ROOT).unwrap(), vec![ROOT]);
    }

    #[test]
    fn test_lineage_unknown_and_broken() {
        let mut tax = Taxonomy::default();
        tax.read_nodes(
            Cursor::new("1\t|\t1\t|\tno rank\t|\n5\t|\t6\t|\tgenus\t|\n6\t|\t5\t|\tfamily\t|\n7\t|\t99\t|\tspecies\t|\n"),
            Path::new("mem"),
        )
        .unwrap();
        assert!(matches!(tax.lineage(42), Err(MbError::BrokenLineage { .. })));
        assert!(matches!(tax.lineage(5), Err(MbError::BrokenLineage { .. })));
        assert!(matches!(tax.lineage(7), Err(MbError::BrokenLineage { .. })));
    }

    #[test]
    fn test_names_with_unknown_taxid() {
        let mut tax = Taxonomy::default();
        tax.read_nodes(Cursor::new("1\t|\t1\t|\tno rank\t|\n"), Path::new("mem"))
            .unwrap();
        let err = tax
            .read_names(
                Cursor::new("12\t|\tGhost\t|\t\t|\tscientific name\t|\n"),
                Path::new("mem"),
            )
            .err()
            .unwrap();
        assert!(matches!(err, MbError::UnknownTaxid(12)));
    }

    #[test]
    fn test_malformed_node_line() {
        let mut tax = Taxonomy::default();
        let err = tax
            .read_nodes(Cursor::new("abc\t|\t1\t|\tgenus\t|\n"), Path::new("mem"))
            .err()
            .unwrap();
        assert!(matches!(err, MbError::MalformedLine { line: 1, .. }));
    }

    #[test]
    fn test_rank_names_keep_first_position() {
        let mut names = RankNames::default();
        names.insert("A", 1);
        names.insert("B", 2);
        names.insert("A", 3);
        let collected: Vec<_> = names.iter().collect();
        assert_eq!(collected, vec![("A", 3), ("B", 2)]);
    }
}
