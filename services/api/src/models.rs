//! API models for request and response payloads

pub mod cart;
pub mod category;
pub mod chat;
pub mod inventory;
pub mod knowledge;
pub mod notification;
pub mod order;
pub mod product;
pub mod promotion;
pub mod user;
pub mod wishlist;

pub use cart::{AddToCartRequest, CartLine, UpdateCartRequest, cart_subtotal};
pub use category::Category;
pub use chat::{
    ChatMessage, ChatSession, ChatSessionView, ChatStatus, NewMessage, SenderType, SessionKind,
};
pub use knowledge::{KnowledgeCategory, KnowledgeEntry};
pub use notification::{NewNotification, Notification, NotificationQuery};
pub use order::{
    Order, OrderChannel, OrderDetail, OrderItemProduct, OrderItemView, OrderReceipt, OrderStatus,
    OrderSummary,
};
pub use product::{Product, ProductQuery, ProductStatus};
pub use promotion::{Promotion, PromotionType};
pub use user::{CustomerDetail, CustomerOrder, CustomerSummary, StaffMember};
pub use wishlist::WishlistItem;
