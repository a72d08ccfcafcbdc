//! Microsoft To Do task list types.
//!
//! # Wire Format
//!
//! ```json
//! {
//!     "@odata.context": "https://graph.microsoft.com/v1.0/$metadata#lists",
//!     "value": [
//!         {
//!             "id": "AAMkADIyAAAAABrJAAA=",
//!             "displayName": "Tasks",
//!             "isOwner": true,
//!             "isShared": false,
//!             "wellKnownListName": "defaultList"
//!         }
//!     ]
//! }
//! ```

use serde::{Deserialize, Serialize};

/// A single task list.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize, Hash)]
#[serde(rename_all = "camelCase")]
pub struct TaskList {
    pub id: String,

    pub display_name: String,

    #[serde(default)]
    pub is_owner: bool,

    #[serde(default)]
    pub is_shared: bool,

    #[serde(default)]
    pub well_known_list_name: String,
}

/// A page of task lists.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize)]
pub struct TaskLists {
    #[serde(rename = "value", default)]
    pub lists: Vec<TaskList>,
}

/// Body for creating or renaming a list.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListName<'a> {
    pub display_name: &'a str,
}
