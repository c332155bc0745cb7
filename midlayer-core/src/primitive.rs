//! OSM primitive types: nodes, ways, relations, and their members.
//!
//! An OSM primitive has a unique 64-bit signed id within its own type
//! (`osmid_t` in the source this design is grounded on); ids of different
//! types may collide, so a [`Member`] always pairs its id with a
//! [`MemberType`].

use geo::Coord;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A WGS84 location, or the absence of one.
///
/// `None` represents "not present": a node that was never stored, was
/// deleted, or fell outside the cache's retention policy. This is the
/// in-memory counterpart of the flat node file's `(i32::MIN, i32::MIN)`
/// sentinel.
pub type Location = Option<Coord<f64>>;

/// An OSM node: an id plus an optional resolved location.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Node {
    /// The node's unique id.
    pub id: i64,
    /// The node's location, or `None` if unresolved.
    pub location: Location,
}

impl Node {
    /// Construct a node with a resolved location.
    #[must_use]
    pub const fn new(id: i64, location: Coord<f64>) -> Self {
        Self {
            id,
            location: Some(location),
        }
    }

    /// Construct a node with no resolved location.
    #[must_use]
    pub const fn missing(id: i64) -> Self {
        Self { id, location: None }
    }
}

/// A single `key=value` tag pair.
pub type Tag = (String, String);

/// An ordered list of key/value tag pairs.
///
/// Kept as a `Vec` rather than a map to preserve insertion order, which
/// downstream scripted transforms (out of scope here) rely on.
pub type TagList = Vec<Tag>;

/// An OSM way: an id, an ordered list of node references, and tags.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Way {
    /// The way's unique id.
    pub id: i64,
    /// Ordered node ids referenced by this way; length may be zero.
    pub nodes: Vec<i64>,
    /// The way's tags.
    pub tags: TagList,
}

impl Way {
    /// Construct a way from its parts.
    #[must_use]
    pub const fn new(id: i64, nodes: Vec<i64>, tags: TagList) -> Self {
        Self { id, nodes, tags }
    }
}

/// The type of OSM primitive a relation member refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MemberType {
    /// The member is a node.
    Node,
    /// The member is a way.
    Way,
    /// The member is another relation.
    Relation,
}

/// One member of a relation: a typed id plus its role string.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Member {
    /// Whether `id` refers to a node, way, or relation.
    pub member_type: MemberType,
    /// The referenced primitive's id.
    pub id: i64,
    /// The member's role within the relation, e.g. `"outer"`.
    pub role: String,
}

impl Member {
    /// Construct a member from its parts.
    #[must_use]
    pub const fn new(member_type: MemberType, id: i64, role: String) -> Self {
        Self {
            member_type,
            id,
            role,
        }
    }
}

/// An OSM relation: an id, tags, and an ordered list of members.
///
/// No cycle check is performed; a relation may reference missing
/// members, and those are reported to callers as absent rather than
/// causing the relation record itself to be rejected.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Relation {
    /// The relation's unique id.
    pub id: i64,
    /// Ordered relation members.
    pub members: Vec<Member>,
    /// The relation's tags.
    pub tags: TagList,
}

impl Relation {
    /// Construct a relation from its parts.
    #[must_use]
    pub const fn new(id: i64, members: Vec<Member>, tags: TagList) -> Self {
        Self { id, members, tags }
    }

    /// Return the ids of every member with [`MemberType::Way`], in order.
    #[must_use]
    pub fn way_member_ids(&self) -> Vec<i64> {
        self.members
            .iter()
            .filter(|member| member.member_type == MemberType::Way)
            .map(|member| member.id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{Member, MemberType, Node, Relation, Way};
    use geo::Coord;

    #[test]
    fn node_missing_has_no_location() {
        let node = Node::missing(1);
        assert_eq!(node.location, None);
    }

    #[test]
    fn node_new_resolves_location() {
        let node = Node::new(1, Coord { x: 1.0, y: 2.0 });
        assert_eq!(node.location, Some(Coord { x: 1.0, y: 2.0 }));
    }

    #[test]
    fn way_member_ids_filters_by_type() {
        let relation = Relation::new(
            1,
            vec![
                Member::new(MemberType::Way, 10, "outer".to_owned()),
                Member::new(MemberType::Node, 20, String::new()),
                Member::new(MemberType::Way, 30, "inner".to_owned()),
            ],
            Vec::new(),
        );
        assert_eq!(relation.way_member_ids(), vec![10, 30]);
    }

    #[test]
    fn way_holds_empty_node_list() {
        let way = Way::new(1, Vec::new(), Vec::new());
        assert!(way.nodes.is_empty());
    }
}
