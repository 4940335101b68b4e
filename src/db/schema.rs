/// Table and column reference handed to the SQL generation and correction
/// prompts.
pub const SCHEMA_DEFINITION: &str = r#"DATABASE: e-commerce store (SQLite)

TABLE products -- catalog of items for sale
  id INTEGER PK
  cost REAL -- acquisition cost, not the sale price
  category TEXT -- e.g. 'Accessories', 'Outerwear'
  name TEXT
  brand TEXT
  retail_price REAL -- list price (MSRP)
  department TEXT -- 'Men' / 'Women'
  sku TEXT
  distribution_center_id INTEGER FK -> distribution_centers.id

TABLE users -- registered customers
  id INTEGER PK
  first_name TEXT, last_name TEXT, email TEXT
  age INTEGER
  gender TEXT -- 'M' / 'F'
  state TEXT, street_address TEXT, postal_code TEXT, city TEXT, country TEXT
  latitude REAL, longitude REAL
  traffic_source TEXT -- acquisition channel, e.g. 'Search', 'Organic'
  created_at TIMESTAMP

TABLE orders -- one row per basket
  order_id INTEGER PK
  user_id INTEGER FK -> users.id
  status TEXT -- 'Complete', 'Cancelled', 'Returned', 'Shipped', 'Processing'
  gender TEXT
  created_at TIMESTAMP, returned_at TIMESTAMP, shipped_at TIMESTAMP, delivered_at TIMESTAMP
  num_of_item INTEGER

TABLE order_items -- line items; the source of revenue
  id INTEGER PK
  order_id INTEGER FK -> orders.order_id
  user_id INTEGER FK -> users.id
  product_id INTEGER FK -> products.id
  inventory_item_id INTEGER FK -> inventory_items.id
  status TEXT
  created_at TIMESTAMP, shipped_at TIMESTAMP, delivered_at TIMESTAMP, returned_at TIMESTAMP
  sale_price REAL -- price actually paid; use this for revenue

TABLE inventory_items -- every physical unit that entered a warehouse
  id INTEGER PK
  product_id INTEGER FK -> products.id
  created_at TIMESTAMP
  sold_at TIMESTAMP -- NULL while in stock
  cost REAL
  product_category TEXT, product_name TEXT, product_brand TEXT
  product_retail_price REAL, product_department TEXT, product_sku TEXT
  product_distribution_center_id INTEGER FK -> distribution_centers.id

TABLE distribution_centers -- warehouses
  id INTEGER PK
  name TEXT -- e.g. 'Memphis TN'
  latitude REAL, longitude REAL

TABLE events -- web analytics
  id INTEGER PK
  user_id REAL FK -> users.id, NULL for guests
  sequence_number INTEGER
  session_id TEXT
  created_at TIMESTAMP
  ip_address TEXT, city TEXT, state TEXT, postal_code TEXT
  browser TEXT
  traffic_source TEXT
  uri TEXT
  event_type TEXT -- 'product', 'department', 'cart', 'purchase', ...

Timestamps are ISO-8601 TEXT ('YYYY-MM-DD HH:MM:SS')."#;
