pub mod test_offer_answer;
