/// Named collections and partitions of domain objects
use indexmap::{IndexMap, IndexSet};

use crate::keyed_map::MemberKind;

/// An ordered set of domain-object names of one kind
#[derive(Debug, Clone, PartialEq)]
pub struct Collection {
    pub name: String,
    kind: MemberKind,
    members: IndexSet<String>,
}

impl Collection {
    pub fn new<I, S>(name: impl Into<String>, kind: MemberKind, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Collection {
            name: name.into(),
            kind,
            members: members.into_iter().map(Into::into).collect(),
        }
    }

    pub fn kind(&self) -> MemberKind {
        self.kind
    }

    pub fn contains(&self, member: &str) -> bool {
        self.members.contains(member)
    }

    pub fn members(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|m| m.as_str())
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Assignment of domain objects to named clusters
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    pub name: String,
    kind: MemberKind,
    assignments: IndexMap<String, String>,
}

impl Partition {
    pub fn new(name: impl Into<String>, kind: MemberKind) -> Self {
        Partition {
            name: name.into(),
            kind,
            assignments: IndexMap::new(),
        }
    }

    pub fn with(mut self, member: impl Into<String>, cluster: impl Into<String>) -> Self {
        self.assign(member, cluster);
        self
    }

    pub fn assign(&mut self, member: impl Into<String>, cluster: impl Into<String>) {
        self.assignments.insert(member.into(), cluster.into());
    }

    pub fn kind(&self) -> MemberKind {
        self.kind
    }

    pub fn cluster_of(&self, member: &str) -> Option<&str> {
        self.assignments.get(member).map(|c| c.as_str())
    }

    /// Cluster names mapped to their members, in first-seen order
    pub fn clusters(&self) -> IndexMap<&str, Vec<&str>> {
        let mut clusters: IndexMap<&str, Vec<&str>> = IndexMap::new();
        for (member, cluster) in &self.assignments {
            clusters
                .entry(cluster.as_str())
                .or_default()
                .push(member.as_str());
        }
        clusters
    }
}
