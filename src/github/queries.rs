use serde::Deserialize;
use serde_json::{json, Value};

use super::{ItemsPage, RawItem};
use crate::error::SyncError;

pub const PAGE_SIZE: u32 = 100;

const ITEMS_QUERY: &str = r#"query($projectId: ID!, $first: Int!, $after: String) {
  node(id: $projectId) {
    ... on ProjectV2 {
      items(first: $first, after: $after) {
        nodes {
          id
          content {
            ... on Issue { id }
            ... on PullRequest { id }
          }
          fieldValues(first: 20) {
            nodes {
              ... on ProjectV2ItemFieldSingleSelectValue {
                optionId
                field { ... on ProjectV2SingleSelectField { id } }
              }
            }
          }
        }
        pageInfo { hasNextPage endCursor }
      }
    }
  }
}"#;

const ADD_ITEM_MUTATION: &str = r#"mutation($projectId: ID!, $contentId: ID!) {
  addProjectV2ItemById(input: { projectId: $projectId, contentId: $contentId }) {
    item { id }
  }
}"#;

const SET_FIELD_MUTATION: &str = r#"mutation(
  $projectId: ID!
  $itemId: ID!
  $fieldId: ID!
  $optionId: String!
) {
  updateProjectV2ItemFieldValue(input: {
    projectId: $projectId
    itemId: $itemId
    fieldId: $fieldId
    value: { singleSelectOptionId: $optionId }
  }) {
    projectV2Item { id }
  }
}"#;

pub fn items_body(project_id: &str, cursor: Option<&str>) -> Value {
    json!({
        "query": ITEMS_QUERY,
        "variables": { "projectId": project_id, "first": PAGE_SIZE, "after": cursor },
    })
}

pub fn add_item_body(project_id: &str, content_id: &str) -> Value {
    json!({
        "query": ADD_ITEM_MUTATION,
        "variables": { "projectId": project_id, "contentId": content_id },
    })
}

pub fn set_field_body(project_id: &str, item_id: &str, field_id: &str, option_id: &str) -> Value {
    json!({
        "query": SET_FIELD_MUTATION,
        "variables": {
            "projectId": project_id,
            "itemId": item_id,
            "fieldId": field_id,
            "optionId": option_id,
        },
    })
}

#[derive(Deserialize)]
pub struct GqlResponse<T> {
    pub data: Option<T>,
    pub errors: Option<Vec<GqlError>>,
}

#[derive(Deserialize)]
pub struct GqlError {
    pub message: String,
}

impl<T> GqlResponse<T> {
    /// Surface the `errors` array as-is; otherwise hand back `data`.
    pub fn into_data(self) -> Result<Option<T>, SyncError> {
        match self.errors {
            Some(errors) if !errors.is_empty() => Err(SyncError::Remote(
                errors
                    .into_iter()
                    .map(|e| e.message)
                    .collect::<Vec<_>>()
                    .join("; "),
            )),
            _ => Ok(self.data),
        }
    }
}

#[derive(Deserialize)]
pub struct ItemsData {
    node: Option<ProjectNode>,
}

#[derive(Deserialize)]
struct ProjectNode {
    items: Option<ItemConnection>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemConnection {
    #[serde(default)]
    nodes: Vec<Option<ItemNode>>,
    page_info: PageInfo,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemNode {
    id: String,
    content: Option<ContentNode>,
    field_values: Option<FieldValueConnection>,
}

#[derive(Deserialize)]
struct ContentNode {
    id: Option<String>,
}

#[derive(Deserialize)]
struct FieldValueConnection {
    #[serde(default)]
    nodes: Vec<Option<FieldValueNode>>,
}

// Non single-select values come back as `{}`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FieldValueNode {
    option_id: Option<String>,
    field: Option<FieldRef>,
}

#[derive(Deserialize)]
struct FieldRef {
    id: Option<String>,
}

impl ItemsData {
    pub fn into_page(self) -> Result<ItemsPage, SyncError> {
        let items = self
            .node
            .and_then(|n| n.items)
            .ok_or_else(|| SyncError::Remote("Project not found or not a ProjectV2 board".into()))?;

        let nodes = items
            .nodes
            .into_iter()
            .flatten()
            .map(|node| RawItem {
                id: node.id,
                content_id: node.content.and_then(|c| c.id),
                single_select_values: node
                    .field_values
                    .map(|fv| {
                        fv.nodes
                            .into_iter()
                            .flatten()
                            .filter_map(|v| Some((v.field?.id?, v.option_id?)))
                            .collect()
                    })
                    .unwrap_or_default(),
            })
            .collect();

        Ok(ItemsPage {
            items: nodes,
            has_next_page: items.page_info.has_next_page,
            end_cursor: items.page_info.end_cursor,
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItemData {
    add_project_v2_item_by_id: Option<AddItemPayload>,
}

#[derive(Deserialize)]
struct AddItemPayload {
    item: Option<IdNode>,
}

#[derive(Deserialize)]
struct IdNode {
    id: Option<String>,
}

impl AddItemData {
    pub fn item_id(self) -> Option<String> {
        self.add_project_v2_item_by_id?.item?.id
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetFieldData {
    update_project_v2_item_field_value: Option<SetFieldPayload>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetFieldPayload {
    project_v2_item: Option<IdNode>,
}

impl SetFieldData {
    pub fn item_id(self) -> Option<String> {
        self.update_project_v2_item_field_value?.project_v2_item?.id
    }
}
