use uuid::Uuid;

/// User row used by the PostgreSQL suite
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
}

impl User {
    pub fn new(username: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: format!("{username}@example.com"),
        }
    }
}

/// Order row used by the PostgreSQL suite
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_name: String,
    pub amount: i64,
}

impl Order {
    pub fn for_user(user: &User, product_name: &str, amount: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user.id,
            product_name: product_name.to_string(),
            amount,
        }
    }
}
