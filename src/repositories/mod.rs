pub mod organization;
pub mod scan_log;
pub mod subscription;
pub mod user;

pub use organization::OrganizationRepository;
pub use scan_log::{ScanLogRepository, ScanStart};
pub use subscription::{NewSubscription, SubscriptionRepository};
pub use user::{UserRepository, UserRepositoryTrait};
