//! Collection domain types

mod item;

pub use item::{
    Collection, CollectionInfo, CollectionNode, DEFAULT_COLLECTION_VERSION, Folder, RequestItem,
    join_path,
};
