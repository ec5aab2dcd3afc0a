pub mod permission;
pub mod resource;
pub mod resource_type;
pub mod subject;

pub use permission::Entity as Permission;
pub use resource::Entity as Resource;
pub use resource_type::Entity as ResourceType;
pub use subject::Entity as Subject;
