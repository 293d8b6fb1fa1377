use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An ordered parent → child membership table.
///
/// Every identifier returned here is a compile-time constant, so the engine can
/// format them into SQL without quoting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    ProtocolTasks,
    SectionSubsections,
    ProtocolSections,
}

impl Relation {
    pub const ALL: [Relation; 3] = [
        Relation::ProtocolTasks,
        Relation::SectionSubsections,
        Relation::ProtocolSections,
    ];

    /// Join table holding the memberships
    pub fn table(self) -> &'static str {
        match self {
            Relation::ProtocolTasks => "protocol_tasks",
            Relation::SectionSubsections => "section_subsections",
            Relation::ProtocolSections => "protocol_sections",
        }
    }

    pub fn parent_table(self) -> &'static str {
        match self {
            Relation::ProtocolTasks | Relation::ProtocolSections => "protocols",
            Relation::SectionSubsections => "sections",
        }
    }

    pub fn parent_column(self) -> &'static str {
        match self {
            Relation::ProtocolTasks | Relation::ProtocolSections => "protocol_id",
            Relation::SectionSubsections => "section_id",
        }
    }

    pub fn child_table(self) -> &'static str {
        match self {
            Relation::ProtocolTasks => "tasks",
            Relation::SectionSubsections => "subsections",
            Relation::ProtocolSections => "sections",
        }
    }

    pub fn child_column(self) -> &'static str {
        match self {
            Relation::ProtocolTasks => "task_id",
            Relation::SectionSubsections => "subsection_id",
            Relation::ProtocolSections => "section_id",
        }
    }

    /// Human-readable parent noun, used in error messages
    pub fn parent_label(self) -> &'static str {
        match self {
            Relation::ProtocolTasks | Relation::ProtocolSections => "protocol",
            Relation::SectionSubsections => "section",
        }
    }

    pub fn child_label(self) -> &'static str {
        match self {
            Relation::ProtocolTasks => "task",
            Relation::SectionSubsections => "subsection",
            Relation::ProtocolSections => "section",
        }
    }

    /// Default child associations that are copied onto a new membership
    pub fn associations(self) -> &'static [AssociationKind] {
        match self {
            Relation::ProtocolTasks => &[AssociationKind::TaskSensors, AssociationKind::TaskDomains],
            Relation::SectionSubsections => &[AssociationKind::SubsectionSensors],
            Relation::ProtocolSections => &[],
        }
    }

    /// Relations whose children live in `table`
    pub fn with_child_table(table: &str) -> impl Iterator<Item = Relation> + '_ {
        Self::ALL.into_iter().filter(move |r| r.child_table() == table)
    }

    pub fn slug(self) -> &'static str {
        match self {
            Relation::ProtocolTasks => "protocol-tasks",
            Relation::SectionSubsections => "section-subsections",
            Relation::ProtocolSections => "protocol-sections",
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Relation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.replace('_', "-").as_str() {
            "protocol-tasks" => Ok(Relation::ProtocolTasks),
            "section-subsections" => Ok(Relation::SectionSubsections),
            "protocol-sections" => Ok(Relation::ProtocolSections),
            other => Err(format!(
                "Unknown relation '{}' (expected protocol-tasks, section-subsections or protocol-sections)",
                other
            )),
        }
    }
}

/// A child → attribute association that has a child-level default table and a
/// membership-scoped override table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationKind {
    TaskSensors,
    TaskDomains,
    SubsectionSensors,
}

impl AssociationKind {
    pub fn relation(self) -> Relation {
        match self {
            AssociationKind::TaskSensors | AssociationKind::TaskDomains => Relation::ProtocolTasks,
            AssociationKind::SubsectionSensors => Relation::SectionSubsections,
        }
    }

    /// Child-level defaults, e.g. `task_sensors`
    pub fn default_table(self) -> &'static str {
        match self {
            AssociationKind::TaskSensors => "task_sensors",
            AssociationKind::TaskDomains => "task_domains",
            AssociationKind::SubsectionSensors => "subsection_sensors",
        }
    }

    pub fn default_column(self) -> &'static str {
        self.relation().child_column()
    }

    /// Membership-scoped copies, e.g. `protocol_task_sensors`
    pub fn membership_table(self) -> &'static str {
        match self {
            AssociationKind::TaskSensors => "protocol_task_sensors",
            AssociationKind::TaskDomains => "protocol_task_domains",
            AssociationKind::SubsectionSensors => "section_subsection_sensors",
        }
    }

    pub fn membership_column(self) -> &'static str {
        match self {
            AssociationKind::TaskSensors | AssociationKind::TaskDomains => "protocol_task_id",
            AssociationKind::SubsectionSensors => "section_subsection_id",
        }
    }

    pub fn attribute_table(self) -> &'static str {
        match self {
            AssociationKind::TaskSensors | AssociationKind::SubsectionSensors => "sensors",
            AssociationKind::TaskDomains => "domains",
        }
    }

    pub fn attribute_column(self) -> &'static str {
        match self {
            AssociationKind::TaskSensors | AssociationKind::SubsectionSensors => "sensor_id",
            AssociationKind::TaskDomains => "domain_id",
        }
    }

    /// Path segment used by the HTTP layer: `sensors` or `domains`
    pub fn slug(self) -> &'static str {
        self.attribute_table()
    }

    /// Resolve `sensors` / `domains` for a relation
    pub fn for_relation(relation: Relation, slug: &str) -> Option<AssociationKind> {
        relation
            .associations()
            .iter()
            .copied()
            .find(|kind| kind.slug() == slug)
    }
}

impl fmt::Display for AssociationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.default_table())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_relation_slugs() {
        assert_eq!("protocol-tasks".parse::<Relation>().unwrap(), Relation::ProtocolTasks);
        assert_eq!("section_subsections".parse::<Relation>().unwrap(), Relation::SectionSubsections);
        assert!("tasks".parse::<Relation>().is_err());

        for relation in Relation::ALL {
            assert_eq!(relation.slug().parse::<Relation>().unwrap(), relation);
        }
    }

    #[test]
    fn association_kinds_belong_to_their_relation() {
        for relation in Relation::ALL {
            for kind in relation.associations() {
                assert_eq!(kind.relation(), relation);
                assert_eq!(kind.default_column(), relation.child_column());
            }
        }
        assert!(Relation::ProtocolSections.associations().is_empty());
    }

    #[test]
    fn resolves_kind_by_slug() {
        assert_eq!(
            AssociationKind::for_relation(Relation::ProtocolTasks, "domains"),
            Some(AssociationKind::TaskDomains)
        );
        assert_eq!(AssociationKind::for_relation(Relation::SectionSubsections, "domains"), None);
    }

    #[test]
    fn sections_are_children_of_protocols_only() {
        let relations: Vec<_> = Relation::with_child_table("sections").collect();
        assert_eq!(relations, vec![Relation::ProtocolSections]);
    }
}
