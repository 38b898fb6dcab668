//! Repositories for database operations

use sqlx::PgPool;

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

pub use cart::CartRepository;
pub use category::CategoryRepository;
pub use chat::ChatRepository;
pub use inventory::InventoryRepository;
pub use knowledge::{KnowledgeFilter, KnowledgeRepository};
pub use notification::NotificationRepository;
pub use order::{OrderFilter, OrderRepository};
pub use product::{ProductFilter, ProductRepository};
pub use promotion::{PromotionRepository, PromotionState};
pub use user::{AccountState, UserRepository};
pub use wishlist::WishlistRepository;

/// Every repository over one shared pool
#[derive(Clone)]
pub struct Repositories {
    pub products: ProductRepository,
    pub categories: CategoryRepository,
    pub cart: CartRepository,
    pub orders: OrderRepository,
    pub promotions: PromotionRepository,
    pub notifications: NotificationRepository,
    pub chat: ChatRepository,
    pub inventory: InventoryRepository,
    pub knowledge: KnowledgeRepository,
    pub users: UserRepository,
    pub wishlist: WishlistRepository,
}

impl Repositories {
    pub fn new(pool: PgPool) -> Self {
        Self {
            products: ProductRepository::new(pool.clone()),
            categories: CategoryRepository::new(pool.clone()),
            cart: CartRepository::new(pool.clone()),
            orders: OrderRepository::new(pool.clone()),
            promotions: PromotionRepository::new(pool.clone()),
            notifications: NotificationRepository::new(pool.clone()),
            chat: ChatRepository::new(pool.clone()),
            inventory: InventoryRepository::new(pool.clone()),
            knowledge: KnowledgeRepository::new(pool.clone()),
            users: UserRepository::new(pool.clone()),
            wishlist: WishlistRepository::new(pool),
        }
    }
}
