mod transaction_guard;
