//! Structured requirements extracted from a product conversation.
//!
//! [`Requirements`] is the full snapshot the client keeps; [`RequirementsUpdate`]
//! is the partial form the model proposes, merged with [`Requirements::merged`].

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::types::{FieldDef, TypeDef};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRole {
    pub role: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequirement {
    pub name: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub access_roles: Vec<String>,
    #[serde(default)]
    pub components: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataField {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataModel {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<DataField>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
    pub name: String,
    #[serde(default)]
    pub trigger: String,
    #[serde(default)]
    pub steps: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Priority {
    MustHave,
    NiceToHave,
}

impl Priority {
    pub const ALL: &'static [&'static str] = &["must-have", "nice-to-have"];
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::MustHave => f.write_str("must-have"),
            Priority::NiceToHave => f.write_str("nice-to-have"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub priority: Priority,
}

/// The current requirements of a project.
///
/// All five collections are always present; missing data is an empty list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Requirements {
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub users: Vec<UserRole>,
    #[serde(default)]
    pub pages: Vec<PageRequirement>,
    #[serde(default)]
    pub data_models: Vec<DataModel>,
    #[serde(default)]
    pub workflows: Vec<Workflow>,
    #[serde(default)]
    pub features: Vec<Feature>,
}

/// Requirements as proposed by the model: any top-level key may be left out.
///
/// `project_name` and `description` distinguish "absent" (`None`) from an
/// explicit `null` (`Some(None)`), since an explicit null overwrites.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementsUpdate {
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub project_name: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub users: Option<Vec<UserRole>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<Vec<PageRequirement>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_models: Option<Vec<DataModel>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflows: Option<Vec<Workflow>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<Vec<Feature>>,
}

// A key that is present (even as null) becomes Some(..).
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// One of the five collections of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    Users,
    Pages,
    DataModels,
    Workflows,
    Features,
}

impl Section {
    pub const ALL: [Section; 5] = [
        Section::Users,
        Section::Pages,
        Section::DataModels,
        Section::Workflows,
        Section::Features,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Section::Users => "User Roles",
            Section::Pages => "Pages",
            Section::DataModels => "Data Models",
            Section::Workflows => "Workflows",
            Section::Features => "Features",
        }
    }
}

impl std::str::FromStr for Section {
    type Err = UnknownSection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "users" | "user" | "roles" => Ok(Section::Users),
            "pages" | "page" => Ok(Section::Pages),
            "datamodels" | "data-models" | "models" | "model" => Ok(Section::DataModels),
            "workflows" | "workflow" => Ok(Section::Workflows),
            "features" | "feature" => Ok(Section::Features),
            _ => Err(UnknownSection(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown section '{0}' (expected users, pages, models, workflows or features)")]
pub struct UnknownSection(pub String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{section:?} has {len} item(s), no item at index {index}")]
pub struct IndexOutOfRange {
    pub section: Section,
    pub index: usize,
    pub len: usize,
}

impl Requirements {
    /// Merge a proposed update over an optional prior snapshot.
    ///
    /// Keys present in the update win; everything else keeps its prior value.
    pub fn merged(prior: Option<&Requirements>, update: &RequirementsUpdate) -> Requirements {
        let mut next = prior.cloned().unwrap_or_default();

        if let Some(name) = &update.project_name {
            next.project_name = name.clone();
        }
        if let Some(description) = &update.description {
            next.description = description.clone();
        }
        if let Some(users) = &update.users {
            next.users = users.clone();
        }
        if let Some(pages) = &update.pages {
            next.pages = pages.clone();
        }
        if let Some(models) = &update.data_models {
            next.data_models = models.clone();
        }
        if let Some(workflows) = &update.workflows {
            next.workflows = workflows.clone();
        }
        if let Some(features) = &update.features {
            next.features = features.clone();
        }

        next
    }

    /// Remove one item from a section, returning the edited copy.
    pub fn without_item(&self, section: Section, index: usize) -> Result<Requirements, IndexOutOfRange> {
        let mut next = self.clone();
        let len = next.len(section);
        if index >= len {
            return Err(IndexOutOfRange { section, index, len });
        }

        match section {
            Section::Users => {
                next.users.remove(index);
            }
            Section::Pages => {
                next.pages.remove(index);
            }
            Section::DataModels => {
                next.data_models.remove(index);
            }
            Section::Workflows => {
                next.workflows.remove(index);
            }
            Section::Features => {
                next.features.remove(index);
            }
        }

        Ok(next)
    }

    pub fn len(&self, section: Section) -> usize {
        match section {
            Section::Users => self.users.len(),
            Section::Pages => self.pages.len(),
            Section::DataModels => self.data_models.len(),
            Section::Workflows => self.workflows.len(),
            Section::Features => self.features.len(),
        }
    }

    pub fn display_name(&self) -> &str {
        self.project_name.as_deref().unwrap_or("Untitled Project")
    }
}

fn string_list() -> TypeDef {
    TypeDef::list(TypeDef::Text)
}

/// Schema of the `requirements` object a model may return.
pub fn requirements_typedef() -> TypeDef {
    TypeDef::Object(vec![
        FieldDef::optional("projectName", TypeDef::nullable(TypeDef::Text)),
        FieldDef::optional("description", TypeDef::nullable(TypeDef::Text)),
        FieldDef::optional(
            "users",
            TypeDef::list(TypeDef::Object(vec![
                FieldDef::required("role", TypeDef::Text),
                FieldDef::required("description", TypeDef::Text),
                FieldDef::required("permissions", string_list()),
            ])),
        ),
        FieldDef::optional(
            "pages",
            TypeDef::list(TypeDef::Object(vec![
                FieldDef::required("name", TypeDef::Text),
                FieldDef::required("path", TypeDef::Text),
                FieldDef::required("description", TypeDef::Text),
                FieldDef::required("accessRoles", string_list()),
                FieldDef::required("components", string_list()),
            ])),
        ),
        FieldDef::optional(
            "dataModels",
            TypeDef::list(TypeDef::Object(vec![
                FieldDef::required("name", TypeDef::Text),
                FieldDef::required(
                    "fields",
                    TypeDef::list(TypeDef::Object(vec![
                        FieldDef::required("name", TypeDef::Text),
                        FieldDef::required("type", TypeDef::Text),
                        FieldDef::required("required", TypeDef::Bool),
                    ])),
                ),
            ])),
        ),
        FieldDef::optional(
            "workflows",
            TypeDef::list(TypeDef::Object(vec![
                FieldDef::required("name", TypeDef::Text),
                FieldDef::required("trigger", TypeDef::Text),
                FieldDef::required("steps", string_list()),
            ])),
        ),
        FieldDef::optional(
            "features",
            TypeDef::list(TypeDef::Object(vec![
                FieldDef::required("name", TypeDef::Text),
                FieldDef::required("description", TypeDef::Text),
                FieldDef::required("priority", TypeDef::OneOf(Priority::ALL)),
            ])),
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::validate;
    use proptest::prelude::*;
    use serde_json::json;

    fn feature(name: &str) -> Feature {
        Feature {
            name: name.into(),
            description: String::new(),
            priority: Priority::MustHave,
        }
    }

    fn workflow(name: &str) -> Workflow {
        Workflow {
            name: name.into(),
            trigger: "manual".into(),
            steps: vec![],
        }
    }

    #[test]
    fn snapshot_always_serializes_every_collection() {
        let value = serde_json::to_value(Requirements::default()).unwrap();
        for key in ["users", "pages", "dataModels", "workflows", "features"] {
            assert_eq!(value[key], json!([]), "{key} should be an empty list");
        }
        assert_eq!(value["projectName"], json!(null));
    }

    #[test]
    fn partial_snapshot_deserializes_with_empty_collections() {
        let r: Requirements = serde_json::from_value(json!({"projectName": "Shop"})).unwrap();
        assert_eq!(r.project_name.as_deref(), Some("Shop"));
        assert!(Section::ALL.iter().all(|s| r.len(*s) == 0));
    }

    #[test]
    fn update_distinguishes_missing_from_null() {
        let u: RequirementsUpdate = serde_json::from_value(json!({"description": null})).unwrap();
        assert_eq!(u.project_name, None);
        assert_eq!(u.description, Some(None));
    }

    #[test]
    fn merge_overwrites_only_keys_in_the_update() {
        let prior = Requirements {
            project_name: Some("Shop".into()),
            description: Some("sells things".into()),
            features: vec![feature("cart")],
            workflows: vec![workflow("checkout")],
            ..Requirements::default()
        };
        let update: RequirementsUpdate = serde_json::from_value(json!({
            "description": null,
            "features": [{"name": "search", "description": "", "priority": "nice-to-have"}]
        }))
        .unwrap();

        let merged = Requirements::merged(Some(&prior), &update);

        assert_eq!(merged.project_name.as_deref(), Some("Shop"));
        assert_eq!(merged.description, None);
        assert_eq!(merged.features.len(), 1);
        assert_eq!(merged.features[0].priority, Priority::NiceToHave);
        assert_eq!(merged.workflows, prior.workflows);
    }

    #[test]
    fn merge_without_prior_starts_from_empty() {
        let update = RequirementsUpdate {
            users: Some(vec![UserRole {
                role: "admin".into(),
                description: String::new(),
                permissions: vec![],
            }]),
            ..RequirementsUpdate::default()
        };
        let merged = Requirements::merged(None, &update);
        assert_eq!(merged.users.len(), 1);
        assert!(merged.pages.is_empty());
        assert_eq!(merged.display_name(), "Untitled Project");
    }

    #[test]
    fn removing_an_item_keeps_the_rest_in_order() {
        let r = Requirements {
            features: vec![feature("a"), feature("b"), feature("c")],
            ..Requirements::default()
        };
        let next = r.without_item(Section::Features, 1).unwrap();
        let names: Vec<_> = next.features.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["a", "c"]);

        let err = r.without_item(Section::Pages, 0).unwrap_err();
        assert_eq!(err.len, 0);
    }

    #[test]
    fn section_names_parse_loosely() {
        assert_eq!("Models".parse::<Section>().unwrap(), Section::DataModels);
        assert_eq!("users".parse::<Section>().unwrap(), Section::Users);
        assert!("widgets".parse::<Section>().is_err());
    }

    #[test]
    fn schema_accepts_a_full_snapshot() {
        let r = Requirements {
            project_name: Some("Shop".into()),
            data_models: vec![DataModel {
                name: "Order".into(),
                fields: vec![DataField {
                    name: "total".into(),
                    ty: "number".into(),
                    required: true,
                }],
            }],
            features: vec![feature("cart")],
            ..Requirements::default()
        };
        let value = serde_json::to_value(&r).unwrap();
        assert!(validate(&requirements_typedef(), &value).is_ok());
    }

    #[test]
    fn schema_rejects_unknown_priority() {
        let value = json!({"features": [{"name": "x", "description": "", "priority": "someday"}]});
        assert!(validate(&requirements_typedef(), &value).is_err());
    }

    fn arb_names() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec("[a-z]{1,8}", 0..4)
    }

    fn arb_snapshot() -> impl Strategy<Value = Requirements> {
        (
            prop::option::of("[A-Za-z ]{1,12}"),
            arb_names(),
            arb_names(),
        )
            .prop_map(|(project_name, features, workflows)| Requirements {
                project_name,
                features: features.iter().map(|n| feature(n)).collect(),
                workflows: workflows.iter().map(|n| workflow(n)).collect(),
                ..Requirements::default()
            })
    }

    fn arb_update() -> impl Strategy<Value = RequirementsUpdate> {
        (
            prop::option::of(prop::option::of("[A-Za-z ]{1,12}")),
            prop::option::of(arb_names()),
        )
            .prop_map(|(project_name, features)| RequirementsUpdate {
                project_name,
                features: features.map(|names| names.iter().map(|n| feature(n)).collect()),
                ..RequirementsUpdate::default()
            })
    }

    proptest! {
        #[test]
        fn merge_keeps_every_collection_and_only_overwrites_given_keys(
            prior in prop::option::of(arb_snapshot()),
            update in arb_update(),
        ) {
            let merged = Requirements::merged(prior.as_ref(), &update);
            let base = prior.clone().unwrap_or_default();

            let value = serde_json::to_value(&merged).unwrap();
            for key in ["users", "pages", "dataModels", "workflows", "features"] {
                prop_assert!(value[key].is_array());
            }

            match &update.project_name {
                Some(name) => prop_assert_eq!(&merged.project_name, name),
                None => prop_assert_eq!(&merged.project_name, &base.project_name),
            }
            match &update.features {
                Some(features) => prop_assert_eq!(&merged.features, features),
                None => prop_assert_eq!(&merged.features, &base.features),
            }
            prop_assert_eq!(&merged.workflows, &base.workflows);
            prop_assert_eq!(&merged.description, &base.description);
        }
    }
}
