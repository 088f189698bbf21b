//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;
pub mod user;
pub mod community;
pub mod artist;
pub mod report;

pub use product::{Product, ProductColor, ProductDraft, ProductError};
pub use order::{new_order_number, Order, OrderError, OrderItem, OrderStatus, PaidCheckout, ReturnRequest, ShippingAddress};
pub use cart::{Cart, CartError, CartItem, CartOwner};
pub use user::{User, UserRole};
pub use community::{CommunityError, ProductVote, Rating, RewardCard, SubmissionStatus, UserProduct};
pub use artist::{Artist, ArtistError, Event, EventDetails, Verification, VerificationStatus};
pub use report::{EmailReport, ReportKind};
