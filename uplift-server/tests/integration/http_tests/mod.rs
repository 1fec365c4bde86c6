mod test_queue_endpoints;
mod test_websocket_call_flow;
